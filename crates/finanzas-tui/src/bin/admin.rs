// finanzas-admin: diagnostics for the balance snapshot and the data tables.
//
// Uses the same configuration as the app. Against the hosted backend it needs
// SUPABASE_SERVICE_KEY to see every user's rows. Logs go to stderr; reports go
// to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use finanzas_app::backend::{self, AdminBackend};
use finanzas_app::reconcile::{
    self, BalanceCheck, BalanceStatus, CheckSummary, FixAction, TableStatus, UserDetails,
    UserSummary,
};
use finanzas_core::config;
use finanzas_core::format::{format_clp, format_percent};
use finanzas_core::model::TransactionKind;

/// Finanzas diagnostics: users, balance snapshots and table access
#[derive(Parser, Debug)]
#[command(name = "finanzas-admin", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Per-user transaction count, stored balance and goal count
    Users,

    /// Transactions, balance snapshot and goals of one user
    User {
        /// User id (UUID)
        id: String,
    },

    /// Compare stored balances against the transactions
    Check {
        /// Only check this user
        #[arg(short, long)]
        user: Option<String>,

        /// Create missing snapshots and overwrite drifted ones
        #[arg(long)]
        fix: bool,
    },

    /// Row counts for every table
    Tables,
}

/// Transactions listed by `user <id>`.
const DETAIL_TRANSACTIONS: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = config::load_config().context("failed to load configuration")?;
    let backend = backend::open_admin_backend(&config).context("failed to open backend")?;
    info!(backend = backend.name(), command = ?args.command, "admin command");

    run(backend.as_ref(), args.command).await
}

async fn run(backend: &dyn AdminBackend, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Users => {
            let users = reconcile::user_overview(backend)
                .await
                .context("failed to read users")?;
            print!("{}", users_report(&users));
        }
        Command::User { id } => {
            let details = reconcile::user_details(backend, &id)
                .await
                .with_context(|| format!("failed to read user {id}"))?;
            print!("{}", user_report(&details));
        }
        Command::Check { user: Some(id), fix } => {
            let check = reconcile::check_user(backend, &id)
                .await
                .with_context(|| format!("failed to check user {id}"))?;
            let action = if fix {
                Some(reconcile::apply_fix(backend, &check).await?)
            } else {
                None
            };
            println!("{}", check_line(&check, action));
        }
        Command::Check { user: None, fix } => {
            let summary = reconcile::check_all(backend, fix)
                .await
                .context("failed to list users")?;
            print!("{}", summary_report(&summary));
        }
        Command::Tables => {
            let statuses = reconcile::verify_tables(backend).await;
            print!("{}", tables_report(&statuses));
            if statuses.iter().any(|s| s.rows.is_err()) {
                anyhow::bail!("some tables are not accessible");
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("finanzas=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

fn users_report(users: &[UserSummary]) -> String {
    if users.is_empty() {
        return "No users found\n".to_string();
    }
    let mut out = format!(
        "{:<38} {:>6} {:>16} {:>6}\n",
        "USER", "TXS", "BALANCE", "GOALS"
    );
    for u in users {
        let balance = u.balance.map(format_clp).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<38} {:>6} {:>16} {:>6}\n",
            u.user_id, u.transaction_count, balance, u.goal_count
        ));
    }
    out.push_str(&format!("{} users\n", users.len()));
    out
}

fn user_report(details: &UserDetails) -> String {
    let mut out = format!("User {}\n", details.user_id);
    match &details.balance {
        Some(b) => out.push_str(&format!("Stored balance: {}\n", format_clp(b.balance))),
        None => out.push_str("Stored balance: missing\n"),
    }

    out.push_str(&format!("\nTransactions ({}):\n", details.transactions.len()));
    for tx in details.transactions.iter().take(DETAIL_TRANSACTIONS) {
        let sign = match tx.kind {
            TransactionKind::Income => '+',
            TransactionKind::Expense => '-',
        };
        let date = tx
            .effective_date()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "----------".to_string());
        out.push_str(&format!(
            "  {date} {sign}{:>14}  {}\n",
            format_clp(tx.amount),
            tx.category
        ));
    }
    if details.transactions.len() > DETAIL_TRANSACTIONS {
        out.push_str(&format!(
            "  ... {} more\n",
            details.transactions.len() - DETAIL_TRANSACTIONS
        ));
    }

    out.push_str(&format!("\nGoals ({}):\n", details.goals.len()));
    for g in &details.goals {
        out.push_str(&format!(
            "  {} {} / {} ({}){}\n",
            g.goal.title,
            format_clp(g.total_contributed),
            format_clp(g.goal.target_amount),
            format_percent(g.progress),
            if g.is_completed { " completed" } else { "" }
        ));
    }
    out
}

fn check_line(check: &BalanceCheck, action: Option<FixAction>) -> String {
    let status = match check.status {
        BalanceStatus::Matches { .. } => "OK".to_string(),
        BalanceStatus::Mismatch { stored, difference } => format!(
            "MISMATCH stored {} (off by {})",
            format_clp(stored),
            format_clp(difference)
        ),
        BalanceStatus::Missing => "MISSING".to_string(),
    };
    let action = match action {
        Some(FixAction::Created) => " -> created",
        Some(FixAction::Updated) => " -> updated",
        Some(FixAction::Unchanged) | None => "",
    };
    format!(
        "{}: {} txs, income {}, expenses {}, computed {} {status}{action}",
        check.user_id,
        check.transaction_count,
        format_clp(check.totals.income),
        format_clp(check.totals.expenses),
        format_clp(check.computed),
    )
}

fn summary_report(summary: &CheckSummary) -> String {
    let mut out = String::new();
    for report in &summary.reports {
        out.push_str(&check_line(&report.check, report.fix));
        out.push('\n');
    }
    for (user_id, error) in &summary.failures {
        out.push_str(&format!("{user_id}: FAILED {error}\n"));
    }
    out.push_str(&format!(
        "{} users checked, {} need attention, {} failed\n",
        summary.reports.len(),
        summary.drifted(),
        summary.failures.len()
    ));
    out
}

fn tables_report(statuses: &[TableStatus]) -> String {
    let mut out = String::new();
    for s in statuses {
        let line = match &s.rows {
            Ok(n) => format!("{:<20} {n} rows\n", s.table.as_str()),
            Err(e) => format!("{:<20} NOT ACCESSIBLE: {e}\n", s.table.as_str()),
        };
        out.push_str(&line);
    }
    out
}
