use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "contas")]
#[command(about = "Local-first accounts-payable tracker", long_about = None)]
pub struct Cli {
    /// Override Contas home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "CONTAS_HOME")]
    pub home: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage recurring bill definitions.
    Bill(BillArgs),
    /// Create a manual payable, optionally split into installments.
    Add(AddArgs),
    /// Launch a recurring bill's occurrence for a period (idempotent).
    Launch(LaunchArgs),
    /// Mark an occurrence administratively done.
    Done(DoneArgs),
    /// Register a payment against an installment.
    Pay(PayArgs),
    /// Cancel an open installment.
    Cancel(CancelArgs),

    /// List installments with derived status.
    List(ListArgs),
    /// Occurrences and bills with due/closing dates inside a window.
    Upcoming(UpcomingArgs),
    /// Totals grouped by status and category for a month.
    Summary(SummaryArgs),
    /// Audit history of a record.
    History(HistoryArgs),

    Company(CompanyArgs),
}

#[derive(Debug, Subcommand)]
pub enum BillCmd {
    Add {
        name: String,
        /// Expected amount per period.
        amount: String,

        #[arg(long)]
        due_day: u32,

        #[arg(long)]
        closing_day: Option<u32>,

        #[arg(long)]
        supplier: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long, short = 'm')]
        notes: Option<String>,
    },
    List,
    /// Deactivate a bill; archived bills refuse launches.
    Archive { name: String },
    /// Reactivate an archived bill.
    Activate { name: String },
}

#[derive(Debug, Args)]
pub struct BillArgs {
    #[command(subcommand)]
    pub cmd: BillCmd,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub description: String,

    /// Total amount of the payable.
    pub total: String,

    /// Number of monthly installments the total is split into.
    #[arg(long, default_value_t = 1)]
    pub installments: u32,

    /// Due date of the first installment (YYYY-MM-DD).
    #[arg(long)]
    pub first_due: String,

    #[arg(long)]
    pub supplier: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, short = 'm')]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// Recurring bill name.
    pub bill: String,

    /// Period to launch as YYYY-MM. Defaults to the current month.
    #[arg(long)]
    pub period: Option<String>,

    /// Date override for "current month" resolution (YYYY-MM-DD).
    #[arg(long)]
    pub today: Option<String>,
}

#[derive(Debug, Args)]
pub struct DoneArgs {
    pub occurrence_id: String,
}

#[derive(Debug, Args)]
pub struct PayArgs {
    pub installment_id: String,

    /// Amount actually paid.
    #[arg(allow_negative_numbers = true)]
    pub amount: String,

    /// Payment date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub method: Option<String>,

    /// Bank account reference the payment went out from.
    #[arg(long)]
    pub account: Option<String>,

    #[arg(long)]
    pub interest: Option<String>,

    #[arg(long)]
    pub penalty: Option<String>,

    #[arg(long)]
    pub discount: Option<String>,

    #[arg(long, short = 'm')]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    pub installment_id: String,

    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Filter by derived status (a_vencer, vencida, paga, cancelada).
    #[arg(long)]
    pub status: Option<String>,

    #[arg(long)]
    pub supplier: Option<String>,

    /// Due-date range start (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<String>,

    /// Due-date range end (YYYY-MM-DD), inclusive.
    #[arg(long)]
    pub to: Option<String>,

    /// Reference date for status derivation (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub today: Option<String>,
}

#[derive(Debug, Args)]
pub struct UpcomingArgs {
    #[arg(long, default_value_t = 7)]
    pub days: u32,

    /// Window start (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub today: Option<String>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Month as YYYY-MM. Defaults to the current month.
    #[arg(long)]
    pub month: Option<String>,

    /// Reference date for status derivation (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub today: Option<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Tracked table name (recurring_bills, bill_occurrences, installments).
    pub table: String,

    pub record_id: String,

    /// Oldest entry first instead of the default newest-first.
    #[arg(long)]
    pub oldest_first: bool,
}

#[derive(Debug, Subcommand)]
pub enum CompanyCmd {
    Check,
    Add { name: String },
    Checkout { name: String },
}

#[derive(Debug, Args)]
pub struct CompanyArgs {
    #[command(subcommand)]
    pub cmd: CompanyCmd,
}
