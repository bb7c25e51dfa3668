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

fn run_err(home: &tempfile::TempDir, args: &[&str]) -> String {
    let mut cmd = contas_cmd();
    cmd.env("CONTAS_HOME", home.path());
    cmd.args(args);
    let err = cmd.assert().failure().get_output().stderr.clone();
    String::from_utf8(err).expect("utf8 stderr")
}

fn company_db_path(home: &Path) -> std::path::PathBuf {
    home.join("data")
        .join("companies")
        .join("main")
        .join("contas.sqlite3")
}

fn count(conn: &rusqlite::Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("count query")
}

#[test]
fn launch_rolls_due_date_past_a_later_closing_day() {
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

    // Closes on the 28th, due on the 5th of the following month.
    let out = run_ok_out(&home, &["launch", "Rent", "--period", "2025-03"]);
    assert!(out.contains("Launched 'Rent' for 2025-03"));
    assert!(out.contains("due 2025-04-05"));
    assert!(out.contains("closing 2025-03-28"));

    let conn = rusqlite::Connection::open(company_db_path(home.path())).expect("open sqlite");
    let (amount, status, due): (String, String, String) = conn
        .query_row(
            "SELECT amount, status, due_date FROM installments LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("read installment");
    assert_eq!(amount, "1500.00");
    assert_eq!(status, "a_vencer");
    assert_eq!(due, "2025-04-05");
}

#[test]
fn launch_clamps_due_day_to_short_months() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Hosting", "80", "--due-day", "31"]);

    let feb = run_ok_out(&home, &["launch", "Hosting", "--period", "2025-02"]);
    assert!(feb.contains("due 2025-02-28"));

    let apr = run_ok_out(&home, &["launch", "Hosting", "--period", "2025-04"]);
    assert!(apr.contains("due 2025-04-30"));
}

#[test]
fn launch_is_idempotent_per_period() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);

    let first = run_ok_out(&home, &["launch", "Rent", "--period", "2025-03"]);
    assert!(first.contains("Launched 'Rent'"));

    let second = run_ok_out(&home, &["launch", "Rent", "--period", "2025-03"]);
    assert!(second.contains("already launched for 2025-03"));

    let third = run_ok_out(&home, &["launch", "Rent", "--period", "2025-03"]);
    assert!(third.contains("already launched for 2025-03"));

    let conn = rusqlite::Connection::open(company_db_path(home.path())).expect("open sqlite");
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM bill_occurrences"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM installments"), 1);

    // A different period is a different occurrence.
    run_ok(&home, &["launch", "Rent", "--period", "2025-04"]);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM bill_occurrences"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM installments"), 2);
}

#[test]
fn launch_defaults_to_the_current_month() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);

    let out = run_ok_out(&home, &["launch", "Rent", "--today", "2025-03-15"]);
    assert!(out.contains("Launched 'Rent' for 2025-03"));
}

#[test]
fn archived_bill_refuses_launch() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);
    run_ok(&home, &["bill", "archive", "Rent"]);

    let err = run_err(&home, &["launch", "Rent", "--period", "2025-03"]);
    assert!(err.contains("archived"));

    // Reactivating makes launches work again.
    run_ok(&home, &["bill", "activate", "Rent"]);
    run_ok(&home, &["launch", "Rent", "--period", "2025-03"]);
}

#[test]
fn done_is_independent_of_payment() {
    let home = tempfile::tempdir().expect("tempdir");

    run_ok(&home, &["bill", "add", "Rent", "1500", "--due-day", "5"]);
    run_ok(&home, &["launch", "Rent", "--period", "2025-03"]);

    let conn = rusqlite::Connection::open(company_db_path(home.path())).expect("open sqlite");
    let occurrence_id: String = conn
        .query_row("SELECT id FROM bill_occurrences LIMIT 1", [], |row| row.get(0))
        .expect("occurrence id");

    let out = run_ok_out(&home, &["done", &occurrence_id]);
    assert!(out.contains("done"));

    let done: i64 = conn
        .query_row("SELECT done FROM bill_occurrences LIMIT 1", [], |row| row.get(0))
        .expect("done flag");
    assert_eq!(done, 1);

    // The installment is untouched: still unpaid and a_vencer.
    let (status, paid): (String, String) = conn
        .query_row(
            "SELECT status, amount_paid FROM installments LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("installment row");
    assert_eq!(status, "a_vencer");
    assert_eq!(paid, "0");
}
