mod cli;
mod config;
mod db;
mod domain;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::cli::{
    AddArgs, BillCmd, CancelArgs, Cli, Command, CompanyCmd, DoneArgs, HistoryArgs, LaunchArgs,
    ListArgs, PayArgs, SummaryArgs, UpcomingArgs,
};
use crate::config::{AppConfig, AppPaths, app_paths, load_or_init_config, now_utc, write_config};
use crate::db::Db;
use crate::domain::{
    CoreError, Installment, InstallmentStatus, PaymentInput, RecurringBill, clamped_date,
    current_status, first_of_month, next_month, split_installment_amounts, total_due,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;

    match cli.command {
        Command::Company(args) => handle_company(args.cmd, &paths, &mut cfg, &cfg_path),
        cmd => {
            let (mut db, _db_path) = Db::open(&paths, &cfg.current_company)?;
            let actor = cfg.actor();

            match cmd {
                Command::Bill(args) => handle_bill(&mut db, args.cmd, &actor),
                Command::Add(args) => handle_add(&mut db, args, &actor),
                Command::Launch(args) => handle_launch(&mut db, args, &actor),
                Command::Done(args) => handle_done(&mut db, args, &actor),
                Command::Pay(args) => handle_pay(&mut db, args, &actor),
                Command::Cancel(args) => handle_cancel(&mut db, args, &actor),
                Command::List(args) => handle_list(&db, args),
                Command::Upcoming(args) => handle_upcoming(&db, args),
                Command::Summary(args) => handle_summary(&db, args),
                Command::History(args) => handle_history(&db, args),
                Command::Company(_) => unreachable!(),
            }
        }
    }
}

fn handle_bill(db: &mut Db, cmd: BillCmd, actor: &str) -> Result<()> {
    match cmd {
        BillCmd::Add {
            name,
            amount,
            due_day,
            closing_day,
            supplier,
            category,
            notes,
        } => {
            if db.get_bill_by_name(&name)?.is_some() {
                return Err(anyhow!("A recurring bill named '{name}' already exists"));
            }

            let now = now_utc();
            let bill = RecurringBill {
                id: Uuid::new_v4(),
                name: name.clone(),
                supplier,
                category,
                closing_day,
                due_day,
                expected_amount: parse_decimal(amount, "amount")?,
                active: true,
                notes,
                created_at: now,
                updated_at: now,
            };

            db.insert_bill(&bill, actor)?;
            println!(
                "Created recurring bill '{}' ({} due day {}).",
                bill.name, bill.expected_amount, bill.due_day
            );
            Ok(())
        }
        BillCmd::List => {
            let bills = db.list_bills()?;
            if bills.is_empty() {
                println!("(no recurring bills)");
                return Ok(());
            }

            println!("name\tsupplier\tcategory\tclosing_day\tdue_day\tamount\tactive");
            for b in bills {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    b.name,
                    b.supplier.as_deref().unwrap_or("-"),
                    b.category.as_deref().unwrap_or("-"),
                    b.closing_day.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
                    b.due_day,
                    b.expected_amount,
                    b.active,
                );
            }
            Ok(())
        }
        BillCmd::Archive { name } => {
            let bill = db.set_bill_active(&name, false, actor)?;
            println!("Archived recurring bill '{}'.", bill.name);
            Ok(())
        }
        BillCmd::Activate { name } => {
            let bill = db.set_bill_active(&name, true, actor)?;
            println!("Reactivated recurring bill '{}'.", bill.name);
            Ok(())
        }
    }
}

fn handle_add(db: &mut Db, args: AddArgs, actor: &str) -> Result<()> {
    if args.installments == 0 {
        return Err(anyhow!("--installments must be at least 1"));
    }

    let total = parse_decimal(args.total, "total")?;
    if total < Decimal::ZERO {
        return Err(anyhow!("Total must not be negative"));
    }
    let first_due = parse_date(&args.first_due, "--first-due")?;

    let amounts = split_installment_amounts(total, args.installments);
    let now = now_utc();

    let mut installments = Vec::with_capacity(amounts.len());
    let mut month = first_of_month(first_due);
    for (idx, amount) in amounts.iter().enumerate() {
        // Subsequent installments keep the first due date's day, clamped.
        let due_date = if idx == 0 {
            first_due
        } else {
            clamped_date(month, first_due.day())
        };
        installments.push(Installment {
            id: Uuid::new_v4(),
            occurrence_id: None,
            description: args.description.clone(),
            supplier: args.supplier.clone(),
            category: args.category.clone(),
            installment_number: (idx + 1) as u32,
            total_installments: args.installments,
            amount: *amount,
            amount_paid: Decimal::ZERO,
            due_date,
            payment_date: None,
            status: InstallmentStatus::AVencer,
            interest: Decimal::ZERO,
            penalty: Decimal::ZERO,
            discount: Decimal::ZERO,
            payment_method: None,
            bank_account: None,
            notes: args.notes.clone(),
            created_at: now,
            updated_at: now,
        });
        month = next_month(month);
    }

    db.insert_manual_installments(&installments, actor)?;

    println!(
        "Created '{}' ({} in {} installment(s)).",
        args.description, total, args.installments
    );
    println!("id\tnumber\tamount\tdue_date");
    for i in &installments {
        println!(
            "{}\t{}/{}\t{}\t{}",
            i.id, i.installment_number, i.total_installments, i.amount, i.due_date
        );
    }
    Ok(())
}

fn handle_launch(db: &mut Db, args: LaunchArgs, actor: &str) -> Result<()> {
    let today = parse_today(args.today.as_deref())?;
    let year_month = match args.period.as_deref() {
        Some(raw) => parse_year_month(raw)?,
        None => first_of_month(today),
    };

    let Some(bill) = db.get_bill_by_name(&args.bill)? else {
        return Err(CoreError::DefinitionNotFound(args.bill).into());
    };

    let (occurrence, created) = db.launch_occurrence(bill.id, year_month, actor)?;
    let period = format_period(occurrence.year_month);
    let closing = occurrence
        .closing_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    if created {
        println!(
            "Launched '{}' for {period}: due {} closing {} occurrence {}.",
            bill.name, occurrence.due_date, closing, occurrence.id
        );
    } else {
        println!(
            "'{}' already launched for {period}: due {} closing {} occurrence {}.",
            bill.name, occurrence.due_date, closing, occurrence.id
        );
    }
    Ok(())
}

fn handle_done(db: &mut Db, args: DoneArgs, actor: &str) -> Result<()> {
    let id = parse_uuid_arg(&args.occurrence_id, "occurrence id")?;
    let occurrence = db.mark_done(id, actor)?;
    println!(
        "Marked occurrence {} ({}) done.",
        occurrence.id,
        format_period(occurrence.year_month)
    );
    Ok(())
}

fn handle_pay(db: &mut Db, args: PayArgs, actor: &str) -> Result<()> {
    let id = parse_uuid_arg(&args.installment_id, "installment id")?;
    let payment = PaymentInput {
        amount_paid: parse_decimal(args.amount, "amount")?,
        payment_date: match args.date.as_deref() {
            Some(raw) => parse_date(raw, "--date")?,
            None => Utc::now().date_naive(),
        },
        method: args.method,
        bank_account: args.account,
        interest: parse_decimal_opt(args.interest, "--interest")?,
        penalty: parse_decimal_opt(args.penalty, "--penalty")?,
        discount: parse_decimal_opt(args.discount, "--discount")?,
        notes: args.notes,
    };

    let installment = db.apply_payment(id, &payment, actor)?;
    println!(
        "Paid '{}' {}/{}: {} of {} due (status {}).",
        installment.description,
        installment.installment_number,
        installment.total_installments,
        installment.amount_paid,
        total_due(installment.amount, &payment),
        installment.status,
    );
    Ok(())
}

fn handle_cancel(db: &mut Db, args: CancelArgs, actor: &str) -> Result<()> {
    let id = parse_uuid_arg(&args.installment_id, "installment id")?;
    let installment = db.cancel_installment(id, args.reason.as_deref(), actor)?;
    println!(
        "Canceled '{}' {}/{}.",
        installment.description, installment.installment_number, installment.total_installments
    );
    Ok(())
}

fn handle_list(db: &Db, args: ListArgs) -> Result<()> {
    let today = parse_today(args.today.as_deref())?;
    let status_filter = args.status.as_deref().map(parse_status).transpose()?;
    let from = args
        .from
        .as_deref()
        .map(|raw| parse_date(raw, "--from"))
        .transpose()?;
    let to = args
        .to
        .as_deref()
        .map(|raw| parse_date(raw, "--to"))
        .transpose()?;

    let installments = db.list_installments()?;
    let mut shown = 0usize;

    println!("id\tdescription\tsupplier\tnumber\tamount\tpaid\tdue_date\tstatus");
    for i in &installments {
        let status = current_status(i, today);
        if let Some(wanted) = status_filter {
            if status != wanted {
                continue;
            }
        }
        if let Some(supplier) = &args.supplier {
            if i.supplier.as_deref() != Some(supplier.as_str()) {
                continue;
            }
        }
        if let Some(from) = from {
            if i.due_date < from {
                continue;
            }
        }
        if let Some(to) = to {
            if i.due_date > to {
                continue;
            }
        }

        println!(
            "{}\t{}\t{}\t{}/{}\t{}\t{}\t{}\t{}",
            i.id,
            i.description,
            i.supplier.as_deref().unwrap_or("-"),
            i.installment_number,
            i.total_installments,
            i.amount,
            i.amount_paid,
            i.due_date,
            status,
        );
        shown += 1;
    }

    if shown == 0 {
        println!("(no installments)");
    }
    Ok(())
}

fn handle_upcoming(db: &Db, args: UpcomingArgs) -> Result<()> {
    let start = parse_today(args.today.as_deref())?;
    let end = start + Duration::days(args.days as i64);

    let mut events: Vec<(NaiveDate, String, String, String, bool)> = Vec::new();
    for (occurrence, bill_name) in db.list_occurrences()? {
        let period = format_period(occurrence.year_month);
        if occurrence.due_date >= start && occurrence.due_date <= end {
            events.push((
                occurrence.due_date,
                bill_name.clone(),
                period.clone(),
                "due".to_string(),
                occurrence.done,
            ));
        }
        if let Some(closing) = occurrence.closing_date {
            if closing >= start && closing <= end {
                events.push((closing, bill_name, period, "closing".to_string(), occurrence.done));
            }
        }
    }
    events.sort();

    if events.is_empty() {
        println!("(nothing in the next {} days)", args.days);
        return Ok(());
    }

    println!("date\tbill\tperiod\tevent\tdone");
    for (date, bill, period, kind, done) in events {
        println!("{date}\t{bill}\t{period}\t{kind}\t{done}");
    }
    Ok(())
}

fn handle_summary(db: &Db, args: SummaryArgs) -> Result<()> {
    let today = parse_today(args.today.as_deref())?;
    let month = match args.month.as_deref() {
        Some(raw) => parse_year_month(raw)?,
        None => first_of_month(today),
    };
    let month_end = next_month(month) - Duration::days(1);

    let mut by_status: BTreeMap<&'static str, (usize, Decimal)> = BTreeMap::new();
    let mut by_category: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();

    for i in db.list_installments()? {
        if i.due_date < month || i.due_date > month_end {
            continue;
        }
        let status = current_status(&i, today);
        let slot = by_status.entry(status.as_str()).or_default();
        slot.0 += 1;
        slot.1 += i.amount;

        let category = i.category.clone().unwrap_or_else(|| "-".to_string());
        let slot = by_category.entry(category).or_default();
        slot.0 += 1;
        slot.1 += i.amount;
    }

    println!("summary for {}", format_period(month));
    println!("status\tcount\ttotal");
    for (status, (count, total)) in &by_status {
        println!("{status}\t{count}\t{total}");
    }
    println!("category\tcount\ttotal");
    for (category, (count, total)) in &by_category {
        println!("{category}\t{count}\t{total}");
    }
    Ok(())
}

fn handle_history(db: &Db, args: HistoryArgs) -> Result<()> {
    let entries = db.history(&args.table, &args.record_id, args.oldest_first)?;
    if entries.is_empty() {
        println!("(no history)");
        return Ok(());
    }

    println!("changed_at\toperation\tactor\told_data\tnew_data");
    for e in entries {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            e.changed_at.to_rfc3339(),
            e.operation.as_str(),
            e.changed_by,
            e.old_data.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
            e.new_data.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

fn handle_company(
    cmd: CompanyCmd,
    paths: &AppPaths,
    cfg: &mut AppConfig,
    cfg_path: &Path,
) -> Result<()> {
    match cmd {
        CompanyCmd::Check => {
            println!("{}", cfg.current_company);
            Ok(())
        }
        CompanyCmd::Add { name } => {
            let (_db, db_path) = Db::open(paths, &name)?;
            println!("Created company '{}' at {}.", name, db_path.display());
            Ok(())
        }
        CompanyCmd::Checkout { name } => {
            cfg.current_company = name.clone();
            write_config(cfg_path, cfg)?;
            println!("Switched to company '{name}'.");
            Ok(())
        }
    }
}

fn parse_decimal(raw: String, what: &str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .map_err(|_| anyhow!("Invalid {what}: '{raw}' is not a decimal number"))
}

fn parse_decimal_opt(raw: Option<String>, what: &str) -> Result<Decimal> {
    match raw {
        Some(raw) => parse_decimal(raw, what),
        None => Ok(Decimal::ZERO),
    }
}

fn parse_date(raw: &str, what: &str) -> Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .map_err(|_| anyhow!("Invalid {what}: expected YYYY-MM-DD, got '{raw}'"))
}

fn parse_today(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(raw) => parse_date(raw, "--today"),
        None => Ok(Utc::now().date_naive()),
    }
}

/// "YYYY-MM" to the first-of-month anchor.
fn parse_year_month(raw: &str) -> Result<NaiveDate> {
    let (year, month) = raw
        .split_once('-')
        .ok_or_else(|| anyhow!("Invalid period: expected YYYY-MM, got '{raw}'"))?;
    let year: i32 = year
        .parse()
        .with_context(|| format!("Invalid year in period '{raw}'"))?;
    let month: u32 = month
        .parse()
        .with_context(|| format!("Invalid month in period '{raw}'"))?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| anyhow!("Invalid period: '{raw}' is not a calendar month"))
}

fn format_period(year_month: NaiveDate) -> String {
    format!("{:04}-{:02}", year_month.year(), year_month.month())
}

fn parse_status(raw: &str) -> Result<InstallmentStatus> {
    InstallmentStatus::parse(raw).ok_or_else(|| {
        anyhow!("Invalid status '{raw}' (expected a_vencer, vencida, paga or cancelada)")
    })
}

fn parse_uuid_arg(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| anyhow!("Invalid {what}: '{raw}'"))
}
