use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::env;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use clinic_ledger::{
    open_database, AccountPatch, AgentRole, CreateTransaction, DeleteOverride, LedgerConfig,
    LedgerCore, NewAccount, TracingNotifier, VERSION,
};

const DEFAULT_DB_PATH: &str = "clinic-ledger.db";
const DEFAULT_CONFIG_PATH: &str = "ledger-config.json";

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&args[2..]),
        Some("register") => run_register(&args[2..]),
        Some("update") => run_update(&args[2..]),
        Some("remove") => run_remove(&args[2..]),
        Some("charge") => run_charge(&args[2..]),
        Some("void") => run_void(&args[2..]),
        Some("history") => run_history(&args[2..]),
        Some("day") => run_day(&args[2..]),
        Some("report") => run_report(&args[2..]),
        Some("accounts") => run_accounts(),
        Some("find") => run_find(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// Initialize logging for the process. Configurable via RUST_LOG.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn print_usage() {
    println!("clinic-ledger v{VERSION}");
    println!();
    println!("Usage:");
    println!("  clinic-ledger init <maintenance-secret>");
    println!("  clinic-ledger register <name> <external-id> <phone> <school> <balance-cents>");
    println!("  clinic-ledger update <external-id> <json-patch>");
    println!("  clinic-ledger remove <external-id>");
    println!("  clinic-ledger charge <external-id> <service> <amount-cents> <agent> <department> [--privileged]");
    println!("  clinic-ledger void <transaction-id> [--maintenance <secret>]");
    println!("  clinic-ledger history <external-id>");
    println!("  clinic-ledger day <YYYY-MM-DD>");
    println!("  clinic-ledger report <start> <end> [department] [--csv <path>]");
    println!("  clinic-ledger accounts");
    println!("  clinic-ledger find <name-fragment>");
    println!();
    println!("Environment:");
    println!("  CLINIC_LEDGER_DB      database path (default: {DEFAULT_DB_PATH})");
    println!("  CLINIC_LEDGER_CONFIG  config path   (default: {DEFAULT_CONFIG_PATH})");
}

fn db_path() -> String {
    env::var("CLINIC_LEDGER_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

fn config_path() -> String {
    env::var("CLINIC_LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

fn open_core() -> Result<LedgerCore> {
    let config_path = config_path();
    if !Path::new(&config_path).exists() {
        bail!("No config at {config_path}. Run: clinic-ledger init <maintenance-secret>");
    }
    let config = LedgerConfig::from_file(&config_path)?;

    let conn = open_database(db_path())?;
    Ok(LedgerCore::new(
        Arc::new(Mutex::new(conn)),
        config,
        Arc::new(TracingNotifier),
    ))
}

fn run_init(args: &[String]) -> Result<()> {
    let secret = args
        .first()
        .ok_or_else(|| anyhow!("init needs the maintenance secret"))?;

    let config = LedgerConfig::with_secret(secret);
    config.to_file(config_path())?;
    println!("✓ Config written: {}", config_path());

    let conn: Connection = open_database(db_path())?;
    drop(conn);
    println!("✓ Database initialized: {}", db_path());

    Ok(())
}

fn run_register(args: &[String]) -> Result<()> {
    let [name, external_id, phone, school, balance] = args else {
        bail!("register needs: <name> <external-id> <phone> <school> <balance-cents>");
    };

    let core = open_core()?;
    let account = core.register_account(NewAccount {
        full_name: name.clone(),
        external_id: external_id.clone(),
        date_of_birth: None,
        phone: phone.clone(),
        school: school.clone(),
        initial_balance: balance.parse().context("balance must be integer cents")?,
    })?;

    println!("✓ Registered {} ({})", account.full_name, account.external_id);
    println!("  id:      {}", account.id);
    println!("  balance: {}", fmt_cents(account.balance));
    Ok(())
}

fn run_update(args: &[String]) -> Result<()> {
    let [external_id, patch_json] = args else {
        bail!("update needs: <external-id> <json-patch>");
    };

    let core = open_core()?;
    let account = core
        .find_by_external_id(external_id)?
        .ok_or_else(|| anyhow!("no account with external id {external_id}"))?;

    let value: serde_json::Value = serde_json::from_str(patch_json).context("patch is not JSON")?;
    let patch = AccountPatch::from_json(value)?;
    let updated = core.update_account(&account.id, patch)?;

    println!("✓ Updated {}", updated.full_name);
    Ok(())
}

fn run_remove(args: &[String]) -> Result<()> {
    let [external_id] = args else {
        bail!("remove needs: <external-id>");
    };

    let core = open_core()?;
    let account = core
        .find_by_external_id(external_id)?
        .ok_or_else(|| anyhow!("no account with external id {external_id}"))?;

    let removed = core.delete_account(&account.id)?;
    println!("✓ Removed {} and all their transactions", removed.full_name);
    Ok(())
}

fn run_charge(args: &[String]) -> Result<()> {
    if args.len() < 5 {
        bail!("charge needs: <external-id> <service> <amount-cents> <agent> <department> [--privileged]");
    }
    let role = if args.iter().any(|a| a == "--privileged") {
        AgentRole::PrivilegedOverride
    } else {
        AgentRole::Standard
    };

    let core = open_core()?;
    let account = core
        .find_by_external_id(&args[0])?
        .ok_or_else(|| anyhow!("no account with external id {}", args[0]))?;

    let tx = core.create_transaction(
        CreateTransaction {
            account_id: account.id.clone(),
            service: args[1].clone(),
            amount: args[2].parse().context("amount must be integer cents")?,
            attended_by: args[3].clone(),
            department: args[4].clone(),
        },
        role,
    )?;

    println!("✓ Charged {} for {}", fmt_cents(tx.amount), tx.service);
    println!("  transaction: {}", tx.id);
    println!("  new balance: {}", fmt_cents(tx.new_balance));
    Ok(())
}

fn run_void(args: &[String]) -> Result<()> {
    let tx_id = args
        .first()
        .ok_or_else(|| anyhow!("void needs: <transaction-id> [--maintenance <secret>]"))?;

    let override_ctx = match args.iter().position(|a| a == "--maintenance") {
        Some(pos) => {
            let secret = args
                .get(pos + 1)
                .ok_or_else(|| anyhow!("--maintenance needs the secret"))?;
            DeleteOverride::maintenance(secret)
        }
        None => DeleteOverride::none(),
    };

    let core = open_core()?;
    let voided = core.delete_transaction(tx_id, &override_ctx)?;
    println!("✓ Voided {} ({} restored)", voided.service, fmt_cents(voided.amount));
    Ok(())
}

fn run_history(args: &[String]) -> Result<()> {
    let [external_id] = args else {
        bail!("history needs: <external-id>");
    };

    let core = open_core()?;
    let account = core
        .find_by_external_id(external_id)?
        .ok_or_else(|| anyhow!("no account with external id {external_id}"))?;

    let history = core.history(&account.id, None)?;
    println!(
        "{} — balance {} — {} transaction(s)",
        account.full_name,
        fmt_cents(account.balance),
        history.len()
    );
    for tx in history {
        println!(
            "  {}  {:<16} {:>10}  bal {:>10}  {} / {}",
            tx.created_at.format("%Y-%m-%d %H:%M"),
            tx.service,
            fmt_cents(tx.amount),
            fmt_cents(tx.new_balance),
            tx.attended_by,
            tx.department,
        );
    }
    Ok(())
}

fn run_day(args: &[String]) -> Result<()> {
    let [date] = args else {
        bail!("day needs: <YYYY-MM-DD>");
    };
    let date = parse_date(date)?;

    let core = open_core()?;
    let entries = core.transactions_by_day(date)?;
    println!("{} transaction(s) on {date} (UTC)", entries.len());
    for entry in entries {
        println!(
            "  {}  {:<24} {:<16} {:>10}  {}",
            entry.created_at.format("%H:%M"),
            entry.full_name.as_deref().unwrap_or("(deleted)"),
            entry.service,
            fmt_cents(entry.amount),
            entry.department,
        );
    }
    Ok(())
}

fn run_report(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("report needs: <start> <end> [department] [--csv <path>]");
    }
    let start = parse_date(&args[0])?;
    let end = parse_date(&args[1])?;

    let csv_path = args
        .iter()
        .position(|a| a == "--csv")
        .map(|pos| {
            args.get(pos + 1)
                .cloned()
                .ok_or_else(|| anyhow!("--csv needs a path"))
        })
        .transpose()?;
    let department = args.get(2).filter(|a| !a.starts_with("--")).map(String::as_str);

    let core = open_core()?;
    let entries = core.report(start, end, department)?;

    if let Some(path) = csv_path {
        let file = File::create(&path).with_context(|| format!("cannot create {path}"))?;
        clinic_ledger::write_report_csv(&entries, file)?;
        println!("✓ Wrote {} row(s) to {path}", entries.len());
        return Ok(());
    }

    println!("{} transaction(s) from {start} to {end} (UTC)", entries.len());
    for entry in &entries {
        println!(
            "  {}  {:<24} {:<16} {:>10}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.full_name.as_deref().unwrap_or("(deleted)"),
            entry.service,
            fmt_cents(entry.amount),
            entry.department,
        );
    }

    println!();
    for total in core.department_totals(start, end)? {
        println!(
            "  {:<16} {:>4} tx  {:>12}",
            total.department,
            total.transaction_count,
            fmt_cents(total.total_amount)
        );
    }
    Ok(())
}

fn run_accounts() -> Result<()> {
    let core = open_core()?;
    let accounts = core.accounts()?;

    println!(
        "{} active account(s) of {} allowed",
        accounts.len(),
        core.config().max_active_accounts
    );
    for account in accounts {
        println!(
            "  {:<24} {:<12} {:>12}  {}",
            account.full_name,
            account.external_id,
            fmt_cents(account.balance),
            account.school,
        );
    }
    Ok(())
}

fn run_find(args: &[String]) -> Result<()> {
    let [term] = args else {
        bail!("find needs: <name-fragment>");
    };

    let core = open_core()?;
    for (id, name) in core.autocomplete_names(term)? {
        println!("  {name}  ({id})");
    }
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad date: {s}"))
}

fn fmt_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
