use crate::config::{AppPaths, company_slug, now_utc};
use crate::domain::{
    AuditEntry, AuditOperation, BillOccurrence, CoreError, Installment, InstallmentStatus,
    PaymentInput, RecurringBill, closing_date_for, due_date_for,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths, company: &str) -> Result<(Self, PathBuf)> {
        let slug = company_slug(company);
        let company_dir = paths.data_dir.join("companies").join(slug);
        fs::create_dir_all(&company_dir)
            .with_context(|| format!("Failed to create company dir {}", company_dir.display()))?;

        let db_path = company_dir.join("contas.sqlite3");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;

        let db = Self { conn };
        db.migrate()?;
        Ok((db, db_path))
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS recurring_bills (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                supplier TEXT,
                category TEXT,
                closing_day INTEGER,
                due_day INTEGER NOT NULL,
                expected_amount TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_recurring_bills_name ON recurring_bills(name);

            CREATE TABLE IF NOT EXISTS bill_occurrences (
                id TEXT PRIMARY KEY,
                bill_id TEXT NOT NULL REFERENCES recurring_bills(id),
                year_month TEXT NOT NULL,
                closing_date TEXT,
                due_date TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE (bill_id, year_month)
            );

            CREATE INDEX IF NOT EXISTS idx_occurrences_due ON bill_occurrences(due_date);

            CREATE TABLE IF NOT EXISTS installments (
                id TEXT PRIMARY KEY,
                occurrence_id TEXT REFERENCES bill_occurrences(id),
                description TEXT NOT NULL,
                supplier TEXT,
                category TEXT,
                installment_number INTEGER NOT NULL,
                total_installments INTEGER NOT NULL,
                amount TEXT NOT NULL,
                amount_paid TEXT NOT NULL,
                due_date TEXT NOT NULL,
                payment_date TEXT,
                status TEXT NOT NULL,
                interest TEXT NOT NULL,
                penalty TEXT NOT NULL,
                discount TEXT NOT NULL,
                payment_method TEXT,
                bank_account TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_installments_due ON installments(due_date);
            CREATE INDEX IF NOT EXISTS idx_installments_status ON installments(status);

            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                record_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                old_data TEXT,
                new_data TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_log(table_name, record_id, changed_at);
            "#,
        )?;
        Ok(())
    }

    pub fn insert_bill(&mut self, bill: &RecurringBill, actor: &str) -> Result<()> {
        bill.validate()?;

        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO recurring_bills
                (id, name, supplier, category, closing_day, due_day, expected_amount,
                 active, notes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                bill.id.to_string(),
                bill.name,
                bill.supplier,
                bill.category,
                bill.closing_day,
                bill.due_day,
                bill.expected_amount.to_string(),
                bill.active as i64,
                bill.notes,
                bill.created_at.to_rfc3339(),
                bill.updated_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to insert recurring bill '{}'", bill.name))?;

        write_audit(
            &tx,
            actor,
            "recurring_bills",
            &bill.id.to_string(),
            AuditOperation::Insert,
            None,
            Some(snapshot(bill)?),
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_bill_by_name(&self, name: &str) -> Result<Option<RecurringBill>> {
        fetch_bill_by_name(&self.conn, name)
    }

    pub fn list_bills(&self) -> Result<Vec<RecurringBill>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, supplier, category, closing_day, due_day, expected_amount,
                   active, notes, created_at, updated_at
            FROM recurring_bills
            ORDER BY name ASC
            "#,
        )?;
        let rows = stmt.query_map([], read_bill)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.parse()?);
        }
        Ok(out)
    }

    /// Flips the active flag. Archived bills stay on file; occurrences keep
    /// referencing them.
    pub fn set_bill_active(&mut self, name: &str, active: bool, actor: &str) -> Result<RecurringBill> {
        let tx = self.conn.transaction()?;

        let old = fetch_bill_by_name(&tx, name)?
            .ok_or_else(|| CoreError::DefinitionNotFound(name.to_string()))?;

        let mut new = old.clone();
        new.active = active;
        new.updated_at = now_utc();

        tx.execute(
            "UPDATE recurring_bills SET active = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                new.active as i64,
                new.updated_at.to_rfc3339(),
                new.id.to_string()
            ],
        )?;

        write_audit(
            &tx,
            actor,
            "recurring_bills",
            &new.id.to_string(),
            AuditOperation::Update,
            Some(snapshot(&old)?),
            Some(snapshot(&new)?),
        )?;
        tx.commit()?;
        Ok(new)
    }

    /// Idempotently creates the occurrence (and its 1/1 installment) for a
    /// period. A second call for the same period, or the loser of a race,
    /// gets the existing row back with `created = false`.
    pub fn launch_occurrence(
        &mut self,
        bill_id: Uuid,
        year_month: NaiveDate,
        actor: &str,
    ) -> Result<(BillOccurrence, bool)> {
        let tx = self.conn.transaction()?;

        let bill = fetch_bill(&tx, bill_id)?
            .ok_or_else(|| CoreError::DefinitionNotFound(bill_id.to_string()))?;
        bill.validate()?;
        if !bill.active {
            return Err(CoreError::DefinitionInactive(bill.name).into());
        }

        let now = now_utc();
        let occurrence = BillOccurrence {
            id: Uuid::new_v4(),
            bill_id: bill.id,
            year_month,
            closing_date: closing_date_for(&bill, year_month),
            due_date: due_date_for(&bill, year_month),
            done: false,
            created_at: now,
        };

        // The UNIQUE(bill_id, year_month) constraint resolves concurrent
        // launches: the loser inserts nothing and re-fetches the winner.
        let inserted = tx.execute(
            r#"
            INSERT INTO bill_occurrences
                (id, bill_id, year_month, closing_date, due_date, done, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(bill_id, year_month) DO NOTHING
            "#,
            params![
                occurrence.id.to_string(),
                occurrence.bill_id.to_string(),
                occurrence.year_month.to_string(),
                occurrence.closing_date.map(|d| d.to_string()),
                occurrence.due_date.to_string(),
                occurrence.done as i64,
                occurrence.created_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            let existing = fetch_occurrence_by_period(&tx, bill.id, year_month)?
                .ok_or_else(|| anyhow!("Occurrence conflict without a stored row"))?;
            tx.commit()?;
            return Ok((existing, false));
        }

        write_audit(
            &tx,
            actor,
            "bill_occurrences",
            &occurrence.id.to_string(),
            AuditOperation::Insert,
            None,
            Some(snapshot(&occurrence)?),
        )?;

        let installment = Installment {
            id: Uuid::new_v4(),
            occurrence_id: Some(occurrence.id),
            description: bill.name.clone(),
            supplier: bill.supplier.clone(),
            category: bill.category.clone(),
            installment_number: 1,
            total_installments: 1,
            amount: bill.expected_amount,
            amount_paid: Decimal::ZERO,
            due_date: occurrence.due_date,
            payment_date: None,
            status: InstallmentStatus::AVencer,
            interest: Decimal::ZERO,
            penalty: Decimal::ZERO,
            discount: Decimal::ZERO,
            payment_method: None,
            bank_account: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        insert_installment(&tx, &installment, actor)?;

        tx.commit()?;
        Ok((occurrence, true))
    }

    pub fn get_occurrence(&self, id: Uuid) -> Result<Option<BillOccurrence>> {
        fetch_occurrence(&self.conn, id)
    }

    /// Occurrences joined with their bill's name and closing/due context.
    pub fn list_occurrences(&self) -> Result<Vec<(BillOccurrence, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT o.id, o.bill_id, o.year_month, o.closing_date, o.due_date, o.done,
                   o.created_at, b.name
            FROM bill_occurrences o
            JOIN recurring_bills b ON b.id = o.bill_id
            ORDER BY o.due_date ASC, b.name ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let raw = read_occurrence(row)?;
            let name: String = row.get(7)?;
            Ok((raw, name))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (raw, name) = row?;
            out.push((raw.parse()?, name));
        }
        Ok(out)
    }

    /// Administrative completion, deliberately independent of payment status.
    pub fn mark_done(&mut self, occurrence_id: Uuid, actor: &str) -> Result<BillOccurrence> {
        let tx = self.conn.transaction()?;

        let old = fetch_occurrence(&tx, occurrence_id)?
            .ok_or_else(|| CoreError::RecordNotFound(occurrence_id.to_string()))?;
        if old.done {
            tx.commit()?;
            return Ok(old);
        }

        let mut new = old.clone();
        new.done = true;

        tx.execute(
            "UPDATE bill_occurrences SET done = 1 WHERE id = ?1",
            params![new.id.to_string()],
        )?;
        write_audit(
            &tx,
            actor,
            "bill_occurrences",
            &new.id.to_string(),
            AuditOperation::Update,
            Some(snapshot(&old)?),
            Some(snapshot(&new)?),
        )?;
        tx.commit()?;
        Ok(new)
    }

    /// Inserts the installments of a manual payable in one transaction.
    pub fn insert_manual_installments(
        &mut self,
        installments: &[Installment],
        actor: &str,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        for installment in installments {
            insert_installment(&tx, installment, actor)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_installment(&self, id: Uuid) -> Result<Option<Installment>> {
        fetch_installment(&self.conn, id)
    }

    pub fn list_installments(&self) -> Result<Vec<Installment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSTALLMENT_COLS} FROM installments ORDER BY due_date ASC, created_at ASC"
        ))?;
        let rows = stmt.query_map([], read_installment)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.parse()?);
        }
        Ok(out)
    }

    /// Applies a payment and flips the installment to `paga` in one guarded
    /// UPDATE; financial fields and status are never observable apart.
    pub fn apply_payment(
        &mut self,
        installment_id: Uuid,
        payment: &PaymentInput,
        actor: &str,
    ) -> Result<Installment> {
        payment.validate()?;

        let tx = self.conn.transaction()?;

        let old = fetch_installment(&tx, installment_id)?
            .ok_or_else(|| CoreError::RecordNotFound(installment_id.to_string()))?;
        if old.status.is_terminal() {
            return Err(CoreError::AlreadyTerminal(old.status).into());
        }

        let mut new = old.clone();
        new.amount_paid = payment.amount_paid;
        new.payment_date = Some(payment.payment_date);
        new.status = InstallmentStatus::Paga;
        new.interest = payment.interest;
        new.penalty = payment.penalty;
        new.discount = payment.discount;
        new.payment_method = payment.method.clone();
        new.bank_account = payment.bank_account.clone();
        if let Some(notes) = &payment.notes {
            new.notes = Some(notes.clone());
        }
        new.updated_at = now_utc();

        // The status guard makes the second of two racing settlements a no-op
        // here, surfaced below as AlreadyTerminal.
        let changed = tx.execute(
            r#"
            UPDATE installments
            SET amount_paid = ?1, payment_date = ?2, status = ?3, interest = ?4,
                penalty = ?5, discount = ?6, payment_method = ?7, bank_account = ?8,
                notes = ?9, updated_at = ?10
            WHERE id = ?11 AND status NOT IN ('paga', 'cancelada')
            "#,
            params![
                new.amount_paid.to_string(),
                new.payment_date.map(|d| d.to_string()),
                new.status.as_str(),
                new.interest.to_string(),
                new.penalty.to_string(),
                new.discount.to_string(),
                new.payment_method,
                new.bank_account,
                new.notes,
                new.updated_at.to_rfc3339(),
                new.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::AlreadyTerminal(old.status).into());
        }

        write_audit(
            &tx,
            actor,
            "installments",
            &new.id.to_string(),
            AuditOperation::Update,
            Some(snapshot(&old)?),
            Some(snapshot(&new)?),
        )?;
        tx.commit()?;
        Ok(new)
    }

    pub fn cancel_installment(
        &mut self,
        installment_id: Uuid,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<Installment> {
        let tx = self.conn.transaction()?;

        let old = fetch_installment(&tx, installment_id)?
            .ok_or_else(|| CoreError::RecordNotFound(installment_id.to_string()))?;
        if old.status.is_terminal() {
            return Err(CoreError::AlreadyTerminal(old.status).into());
        }

        let mut new = old.clone();
        new.status = InstallmentStatus::Cancelada;
        if let Some(reason) = reason {
            new.notes = Some(match &old.notes {
                Some(notes) => format!("{notes}\ncanceled: {reason}"),
                None => format!("canceled: {reason}"),
            });
        }
        new.updated_at = now_utc();

        let changed = tx.execute(
            r#"
            UPDATE installments
            SET status = ?1, notes = ?2, updated_at = ?3
            WHERE id = ?4 AND status NOT IN ('paga', 'cancelada')
            "#,
            params![
                new.status.as_str(),
                new.notes,
                new.updated_at.to_rfc3339(),
                new.id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::AlreadyTerminal(old.status).into());
        }

        write_audit(
            &tx,
            actor,
            "installments",
            &new.id.to_string(),
            AuditOperation::Update,
            Some(snapshot(&old)?),
            Some(snapshot(&new)?),
        )?;
        tx.commit()?;
        Ok(new)
    }

    /// Per-record audit history. Each call re-queries; no cursor state.
    pub fn history(
        &self,
        table: &str,
        record_id: &str,
        oldest_first: bool,
    ) -> Result<Vec<AuditEntry>> {
        let order = if oldest_first { "ASC" } else { "DESC" };
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT id, table_name, record_id, operation, changed_at, changed_by,
                   old_data, new_data
            FROM audit_log
            WHERE table_name = ?1 AND record_id = ?2
            ORDER BY changed_at {order}, rowid {order}
            "#
        ))?;
        let rows = stmt.query_map(params![table, record_id], read_audit)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.parse()?);
        }
        Ok(out)
    }
}

const INSTALLMENT_COLS: &str = "id, occurrence_id, description, supplier, category, \
     installment_number, total_installments, amount, amount_paid, due_date, payment_date, \
     status, interest, penalty, discount, payment_method, bank_account, notes, \
     created_at, updated_at";

fn insert_installment(conn: &Connection, installment: &Installment, actor: &str) -> Result<()> {
    conn.execute(
        &format!(
            r#"
            INSERT INTO installments ({INSTALLMENT_COLS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20)
            "#
        ),
        params![
            installment.id.to_string(),
            installment.occurrence_id.map(|id| id.to_string()),
            installment.description,
            installment.supplier,
            installment.category,
            installment.installment_number,
            installment.total_installments,
            installment.amount.to_string(),
            installment.amount_paid.to_string(),
            installment.due_date.to_string(),
            installment.payment_date.map(|d| d.to_string()),
            installment.status.as_str(),
            installment.interest.to_string(),
            installment.penalty.to_string(),
            installment.discount.to_string(),
            installment.payment_method,
            installment.bank_account,
            installment.notes,
            installment.created_at.to_rfc3339(),
            installment.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert installment '{}'", installment.description))?;

    write_audit(
        conn,
        actor,
        "installments",
        &installment.id.to_string(),
        AuditOperation::Insert,
        None,
        Some(snapshot(installment)?),
    )?;
    Ok(())
}

fn snapshot<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("Failed to snapshot row for audit")
}

/// Appends one audit row. Callers run this inside the same transaction as
/// the mutation it describes; both commit or neither does.
fn write_audit(
    conn: &Connection,
    actor: &str,
    table: &str,
    record_id: &str,
    operation: AuditOperation,
    old_data: Option<serde_json::Value>,
    new_data: Option<serde_json::Value>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO audit_log
            (id, table_name, record_id, operation, changed_at, changed_by, old_data, new_data)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            Uuid::new_v4().to_string(),
            table,
            record_id,
            operation.as_str(),
            now_utc().to_rfc3339(),
            actor,
            old_data.map(|v| v.to_string()),
            new_data.map(|v| v.to_string()),
        ],
    )
    .with_context(|| format!("Failed to write audit entry for {table}/{record_id}"))?;
    Ok(())
}

struct RawBill {
    id: String,
    name: String,
    supplier: Option<String>,
    category: Option<String>,
    closing_day: Option<u32>,
    due_day: u32,
    expected_amount: String,
    active: i64,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_bill(row: &Row) -> rusqlite::Result<RawBill> {
    Ok(RawBill {
        id: row.get(0)?,
        name: row.get(1)?,
        supplier: row.get(2)?,
        category: row.get(3)?,
        closing_day: row.get(4)?,
        due_day: row.get(5)?,
        expected_amount: row.get(6)?,
        active: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl RawBill {
    fn parse(self) -> Result<RecurringBill> {
        Ok(RecurringBill {
            id: parse_uuid(&self.id, "recurring_bills.id")?,
            name: self.name,
            supplier: self.supplier,
            category: self.category,
            closing_day: self.closing_day,
            due_day: self.due_day,
            expected_amount: parse_decimal(&self.expected_amount, "recurring_bills.expected_amount")?,
            active: self.active != 0,
            notes: self.notes,
            created_at: parse_timestamp(&self.created_at, "recurring_bills.created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "recurring_bills.updated_at")?,
        })
    }
}

fn fetch_bill(conn: &Connection, id: Uuid) -> Result<Option<RecurringBill>> {
    let raw = conn
        .query_row(
            r#"
            SELECT id, name, supplier, category, closing_day, due_day, expected_amount,
                   active, notes, created_at, updated_at
            FROM recurring_bills WHERE id = ?1
            "#,
            params![id.to_string()],
            read_bill,
        )
        .optional()?;
    raw.map(RawBill::parse).transpose()
}

fn fetch_bill_by_name(conn: &Connection, name: &str) -> Result<Option<RecurringBill>> {
    let raw = conn
        .query_row(
            r#"
            SELECT id, name, supplier, category, closing_day, due_day, expected_amount,
                   active, notes, created_at, updated_at
            FROM recurring_bills WHERE name = ?1
            "#,
            params![name],
            read_bill,
        )
        .optional()?;
    raw.map(RawBill::parse).transpose()
}

struct RawOccurrence {
    id: String,
    bill_id: String,
    year_month: String,
    closing_date: Option<String>,
    due_date: String,
    done: i64,
    created_at: String,
}

fn read_occurrence(row: &Row) -> rusqlite::Result<RawOccurrence> {
    Ok(RawOccurrence {
        id: row.get(0)?,
        bill_id: row.get(1)?,
        year_month: row.get(2)?,
        closing_date: row.get(3)?,
        due_date: row.get(4)?,
        done: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl RawOccurrence {
    fn parse(self) -> Result<BillOccurrence> {
        Ok(BillOccurrence {
            id: parse_uuid(&self.id, "bill_occurrences.id")?,
            bill_id: parse_uuid(&self.bill_id, "bill_occurrences.bill_id")?,
            year_month: parse_date(&self.year_month, "bill_occurrences.year_month")?,
            closing_date: self
                .closing_date
                .as_deref()
                .map(|d| parse_date(d, "bill_occurrences.closing_date"))
                .transpose()?,
            due_date: parse_date(&self.due_date, "bill_occurrences.due_date")?,
            done: self.done != 0,
            created_at: parse_timestamp(&self.created_at, "bill_occurrences.created_at")?,
        })
    }
}

fn fetch_occurrence(conn: &Connection, id: Uuid) -> Result<Option<BillOccurrence>> {
    let raw = conn
        .query_row(
            r#"
            SELECT id, bill_id, year_month, closing_date, due_date, done, created_at
            FROM bill_occurrences WHERE id = ?1
            "#,
            params![id.to_string()],
            read_occurrence,
        )
        .optional()?;
    raw.map(RawOccurrence::parse).transpose()
}

fn fetch_occurrence_by_period(
    conn: &Connection,
    bill_id: Uuid,
    year_month: NaiveDate,
) -> Result<Option<BillOccurrence>> {
    let raw = conn
        .query_row(
            r#"
            SELECT id, bill_id, year_month, closing_date, due_date, done, created_at
            FROM bill_occurrences WHERE bill_id = ?1 AND year_month = ?2
            "#,
            params![bill_id.to_string(), year_month.to_string()],
            read_occurrence,
        )
        .optional()?;
    raw.map(RawOccurrence::parse).transpose()
}

struct RawInstallment {
    id: String,
    occurrence_id: Option<String>,
    description: String,
    supplier: Option<String>,
    category: Option<String>,
    installment_number: u32,
    total_installments: u32,
    amount: String,
    amount_paid: String,
    due_date: String,
    payment_date: Option<String>,
    status: String,
    interest: String,
    penalty: String,
    discount: String,
    payment_method: Option<String>,
    bank_account: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_installment(row: &Row) -> rusqlite::Result<RawInstallment> {
    Ok(RawInstallment {
        id: row.get(0)?,
        occurrence_id: row.get(1)?,
        description: row.get(2)?,
        supplier: row.get(3)?,
        category: row.get(4)?,
        installment_number: row.get(5)?,
        total_installments: row.get(6)?,
        amount: row.get(7)?,
        amount_paid: row.get(8)?,
        due_date: row.get(9)?,
        payment_date: row.get(10)?,
        status: row.get(11)?,
        interest: row.get(12)?,
        penalty: row.get(13)?,
        discount: row.get(14)?,
        payment_method: row.get(15)?,
        bank_account: row.get(16)?,
        notes: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

impl RawInstallment {
    fn parse(self) -> Result<Installment> {
        let status = InstallmentStatus::parse(&self.status)
            .with_context(|| format!("Invalid status in installments table: {}", self.status))?;
        Ok(Installment {
            id: parse_uuid(&self.id, "installments.id")?,
            occurrence_id: self
                .occurrence_id
                .as_deref()
                .map(|id| parse_uuid(id, "installments.occurrence_id"))
                .transpose()?,
            description: self.description,
            supplier: self.supplier,
            category: self.category,
            installment_number: self.installment_number,
            total_installments: self.total_installments,
            amount: parse_decimal(&self.amount, "installments.amount")?,
            amount_paid: parse_decimal(&self.amount_paid, "installments.amount_paid")?,
            due_date: parse_date(&self.due_date, "installments.due_date")?,
            payment_date: self
                .payment_date
                .as_deref()
                .map(|d| parse_date(d, "installments.payment_date"))
                .transpose()?,
            status,
            interest: parse_decimal(&self.interest, "installments.interest")?,
            penalty: parse_decimal(&self.penalty, "installments.penalty")?,
            discount: parse_decimal(&self.discount, "installments.discount")?,
            payment_method: self.payment_method,
            bank_account: self.bank_account,
            notes: self.notes,
            created_at: parse_timestamp(&self.created_at, "installments.created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "installments.updated_at")?,
        })
    }
}

fn fetch_installment(conn: &Connection, id: Uuid) -> Result<Option<Installment>> {
    let raw = conn
        .query_row(
            &format!("SELECT {INSTALLMENT_COLS} FROM installments WHERE id = ?1"),
            params![id.to_string()],
            read_installment,
        )
        .optional()?;
    raw.map(RawInstallment::parse).transpose()
}

struct RawAudit {
    id: String,
    table_name: String,
    record_id: String,
    operation: String,
    changed_at: String,
    changed_by: String,
    old_data: Option<String>,
    new_data: Option<String>,
}

fn read_audit(row: &Row) -> rusqlite::Result<RawAudit> {
    Ok(RawAudit {
        id: row.get(0)?,
        table_name: row.get(1)?,
        record_id: row.get(2)?,
        operation: row.get(3)?,
        changed_at: row.get(4)?,
        changed_by: row.get(5)?,
        old_data: row.get(6)?,
        new_data: row.get(7)?,
    })
}

impl RawAudit {
    fn parse(self) -> Result<AuditEntry> {
        let operation = AuditOperation::parse(&self.operation)
            .with_context(|| format!("Invalid operation in audit_log: {}", self.operation))?;
        Ok(AuditEntry {
            id: parse_uuid(&self.id, "audit_log.id")?,
            table_name: self.table_name,
            record_id: self.record_id,
            operation,
            changed_at: parse_timestamp(&self.changed_at, "audit_log.changed_at")?,
            changed_by: self.changed_by,
            old_data: self
                .old_data
                .as_deref()
                .map(|raw| serde_json::from_str(raw).context("Invalid old_data in audit_log"))
                .transpose()?,
            new_data: self
                .new_data
                .as_deref()
                .map(|raw| serde_json::from_str(raw).context("Invalid new_data in audit_log"))
                .transpose()?,
        })
    }
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid UUID in {what}"))
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .with_context(|| format!("Invalid decimal in {what}"))
}

fn parse_date(raw: &str, what: &str) -> Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .with_context(|| format!("Invalid date in {what}"))
}

fn parse_timestamp(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in {what}"))
        .map(|ts| ts.with_timezone(&Utc))
}
