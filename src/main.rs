use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use leave_ledger::{
    department_utilization, initialize_year, load_allocations, process_carry_over,
    reset_for_new_year, BalanceStore, InMemoryDirectory,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init-year") => run_init_year(&args[2..]),
        Some("carry-over") => run_carry_over(&args[2..]),
        Some("reset") => run_reset(&args[2..]),
        Some("report") => run_report(&args[2..]),
        _ => {
            eprintln!("Usage:");
            eprintln!("  leave-ledger init-year  <db> <year> <allocations.csv>");
            eprintln!("  leave-ledger carry-over <db> <from-year> <to-year> <max-days>");
            eprintln!("  leave-ledger reset      <db> <year>");
            eprintln!("  leave-ledger report     <db> <year> [departments.csv]");
            std::process::exit(1)
        }
    }
}

fn run_init_year(args: &[String]) -> Result<()> {
    let [db, year, csv_path] = args else {
        bail!("init-year needs <db> <year> <allocations.csv>");
    };
    let year: i32 = year.parse().context("year must be a 4-digit number")?;

    println!("📂 Loading allocations from {csv_path}...");
    let allocations = load_allocations(Path::new(csv_path))?;
    println!("✓ Loaded allocations for {} employees", allocations.len());

    let mut store = BalanceStore::open(Path::new(db))?;
    let summary = initialize_year(&mut store, year, &allocations)?;

    println!("✓ Year {} initialized", summary.year);
    println!("✓ Created: {} balances", summary.created);
    println!("✓ Already present: {}", summary.already_present);
    Ok(())
}

fn run_carry_over(args: &[String]) -> Result<()> {
    let [db, from, to, max_days] = args else {
        bail!("carry-over needs <db> <from-year> <to-year> <max-days>");
    };
    let from: i32 = from.parse().context("from-year must be a number")?;
    let to: i32 = to.parse().context("to-year must be a number")?;
    let max_days: f64 = max_days.parse().context("max-days must be a number")?;

    let mut store = BalanceStore::open(Path::new(db))?;
    let summary = process_carry_over(&mut store, from, to, max_days)?;

    println!("✓ Carry-over {} → {} complete", summary.from_year, summary.to_year);
    println!("✓ Rolled over: {} balances (cap {max_days} days)", summary.rolled_over);
    println!("✓ Skipped (nothing to carry): {}", summary.skipped);
    Ok(())
}

fn run_reset(args: &[String]) -> Result<()> {
    let [db, year] = args else {
        bail!("reset needs <db> <year>");
    };
    let year: i32 = year.parse().context("year must be a number")?;

    let mut store = BalanceStore::open(Path::new(db))?;
    let affected = reset_for_new_year(&mut store, year)?;

    println!("✓ Reset usage on {affected} balances for {year}");
    Ok(())
}

fn run_report(args: &[String]) -> Result<()> {
    let (db, year, departments_csv) = match args {
        [db, year] => (db, year, None),
        [db, year, csv] => (db, year, Some(csv)),
        _ => bail!("report needs <db> <year> [departments.csv]"),
    };
    let year: i32 = year.parse().context("year must be a number")?;

    let mut directory = InMemoryDirectory::new();
    if let Some(csv_path) = departments_csv {
        let count = load_departments(Path::new(csv_path), &mut directory)?;
        println!("✓ Loaded {count} department assignments");
    }

    let store = BalanceStore::open(Path::new(db))?;
    let report = department_utilization(&store, &directory, year)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Rows: employee_id,department
fn load_departments(path: &Path, directory: &mut InMemoryDirectory) -> Result<usize> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut count = 0;
    for result in rdr.deserialize() {
        let (employee_id, department): (i64, String) = result.context("bad department row")?;
        directory.assign(employee_id, department);
        count += 1;
    }
    Ok(count)
}
