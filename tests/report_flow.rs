use assert_cmd::prelude::*;
use std::path::Path;
use std::process::Command;

fn contas_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("contas"))
}

fn run_ok(home: &tempfile::TempDir, args: &[&str]) {
    let mut cmd = contas_cmd();
    cmd.env("CONTAS_HOME", home.path());
    cmd.args(args);
    cmd.assert().success();
}

fn run_ok_out(home: &tempfile::TempDir, args: &[&str]) -> String {
    let mut cmd = contas_cmd();
    cmd.env("CONTAS_HOME", home.path());
    cmd.args(args);
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).expect("utf8 stdout")
}

fn open_db(home: &Path) -> rusqlite::Connection {
    let path = home
        .join("data")
        .join("companies")
        .join("main")
        .join("contas.sqlite3");
    rusqlite::Connection::open(path).expect("open sqlite")
}

#[test]
fn upcoming_shows_due_and_closing_events_inside_the_window() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(
        &home,
        &[
            "bill",
            "add",
            "Rent",
            "1500.00",
            "--due-day",
            "5",
            "--closing-day",
            "28",
        ],
    );
    run_ok(&home, &["launch", "Rent", "--period", "2025-03"]);

    // Window covering the closing date only.
    let closing = run_ok_out(&home, &["upcoming", "--today", "2025-03-25"]);
    assert!(closing.contains("2025-03-28\tRent\t2025-03\tclosing\tfalse"));
    assert!(!closing.contains("\tdue\t"));

    // Window covering the rolled due date only.
    let due = run_ok_out(&home, &["upcoming", "--today", "2025-04-01"]);
    assert!(due.contains("2025-04-05\tRent\t2025-03\tdue\tfalse"));
    assert!(!due.contains("\tclosing\t"));

    // Nothing in a distant window.
    let quiet = run_ok_out(&home, &["upcoming", "--today", "2025-06-01"]);
    assert!(quiet.contains("(nothing in the next 7 days)"));

    // A wider window picks both up.
    let both = run_ok_out(&home, &["upcoming", "--today", "2025-03-25", "--days", "15"]);
    assert!(both.contains("\tclosing\t"));
    assert!(both.contains("\tdue\t"));
}

#[test]
fn upcoming_reflects_the_done_flag() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);
    run_ok(&home, &["launch", "Rent", "--period", "2025-03"]);

    let conn = open_db(home.path());
    let occurrence_id: String = conn
        .query_row("SELECT id FROM bill_occurrences", [], |row| row.get(0))
        .expect("occurrence id");
    drop(conn);

    run_ok(&home, &["done", &occurrence_id]);

    let out = run_ok_out(&home, &["upcoming", "--today", "2025-03-01"]);
    assert!(out.contains("2025-03-05\tRent\t2025-03\tdue\ttrue"));
}

#[test]
fn summary_groups_by_derived_status_and_category() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(
        &home,
        &[
            "add",
            "Rent April",
            "1500.00",
            "--first-due",
            "2025-04-05",
            "--category",
            "Facilities",
        ],
    );
    run_ok(
        &home,
        &[
            "add",
            "Internet April",
            "120.00",
            "--first-due",
            "2025-04-20",
            "--category",
            "IT",
        ],
    );
    // Outside the month; must not be counted.
    run_ok(
        &home,
        &["add", "Rent May", "1500.00", "--first-due", "2025-05-05"],
    );

    let out = run_ok_out(&home, &["summary", "--month", "2025-04", "--today", "2025-04-10"]);
    assert!(out.contains("summary for 2025-04"));
    assert!(out.contains("vencida\t1\t1500.00"));
    assert!(out.contains("a_vencer\t1\t120.00"));
    assert!(out.contains("Facilities\t1\t1500.00"));
    assert!(out.contains("IT\t1\t120.00"));
    assert!(!out.contains("Rent May"));
}

#[test]
fn history_orders_entries_and_keeps_snapshot_invariants() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(
        &home,
        &["add", "Rent March", "1500.00", "--first-due", "2025-04-05"],
    );

    let conn = open_db(home.path());
    let id: String = conn
        .query_row("SELECT id FROM installments", [], |row| row.get(0))
        .expect("installment id");
    drop(conn);

    run_ok(&home, &["pay", &id, "1500.00", "--date", "2025-04-06"]);

    let newest_first = run_ok_out(&home, &["history", "installments", &id]);
    let lines: Vec<&str> = newest_first.lines().skip(1).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\tUPDATE\t"));
    assert!(lines[1].contains("\tINSERT\t"));

    // INSERT carries no before-image.
    assert!(lines[1].contains("\t-\t"));
    assert!(lines[1].contains("a_vencer"));
    // UPDATE carries both snapshots.
    assert!(lines[0].contains("a_vencer"));
    assert!(lines[0].contains("paga"));

    let oldest_first = run_ok_out(&home, &["history", "installments", &id, "--oldest-first"]);
    let lines: Vec<&str> = oldest_first.lines().skip(1).collect();
    assert!(lines[0].contains("\tINSERT\t"));
    assert!(lines[1].contains("\tUPDATE\t"));
}

#[test]
fn bill_archive_is_audited() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);
    run_ok(&home, &["bill", "archive", "Rent"]);

    let conn = open_db(home.path());
    let bill_id: String = conn
        .query_row("SELECT id FROM recurring_bills", [], |row| row.get(0))
        .expect("bill id");
    drop(conn);

    let out = run_ok_out(&home, &["history", "recurring_bills", &bill_id, "--oldest-first"]);
    let lines: Vec<&str> = out.lines().skip(1).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\tINSERT\t"));
    assert!(lines[1].contains("\tUPDATE\t"));
    assert!(lines[1].contains("\"active\":false"));
}

#[test]
fn history_of_an_unknown_record_is_empty() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);

    let out = run_ok_out(
        &home,
        &["history", "installments", "00000000-0000-0000-0000-000000000000"],
    );
    assert!(out.contains("(no history)"));
}
