// Entry point and high-level CLI flow.
//
// - Option [1] loads the transaction and order CSVs, printing diagnostics.
// - Option [2] runs the three dashboard pipelines, writes each catalog as
//   JSON (tables also as CSV) and prints markdown previews.
// - After generating, the user can go back to the selection menu or exit.
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use dashboard_metrics::loader::{self, LoadReport};
use dashboard_metrics::{logger, output, reports, util};
use dashboard_metrics::{MetricCatalog, MetricValue, OrderRecord, PipelineConfig, PipelineError, TransactionRecord, WindowSelector};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "dashboard-metrics")]
#[command(about = "Derive dashboard metric catalogs from transaction data")]
struct Cli {
    #[arg(long, help = "Pipeline configuration (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Reference timestamp, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS (default: now)")]
    now: Option<String>,

    #[arg(long, default_value = "./output")]
    output: PathBuf,

    #[arg(long, default_value = "5", help = "Rows shown per preview table")]
    preview_rows: usize,

    #[arg(long, help = "Enable verbose output")]
    verbose: bool,
}

#[derive(Default)]
struct Loaded {
    transactions: Option<Vec<TransactionRecord>>,
    orders: Option<Vec<OrderRecord>>,
}

fn parse_now(raw: Option<&str>) -> Result<NaiveDateTime, PipelineError> {
    let Some(raw) = raw else {
        return Ok(Local::now().naive_local());
    };
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ts);
    }
    // A bare date means "end of that day" so the day itself is inside the
    // current windows.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.succ_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| PipelineError::config(format!("invalid --now value: {raw}")))
}

/// One trimmed line, or `None` once input is closed or unreadable.
fn read_trimmed(input: &mut impl BufRead) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice(input: &mut impl BufRead) -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    read_trimmed(input)
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N` or input
/// ended.
fn prompt_back_to_menu(input: &mut impl BufRead) -> bool {
    loop {
        print!("Back to Dashboard Selection (Y/N): ");
        let _ = io::stdout().flush();
        let Some(resp) = read_trimmed(input) else {
            return false;
        };
        match resp.to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_load_report(kind: &str, report: &LoadReport) {
    println!(
        "Loaded {} {} rows (decimal separator: {:?}).",
        util::format_int(report.total_rows),
        kind,
        report.decimal_convention
    );
    if report.mixed_separators {
        println!("Note: both '.' and ',' appear in monetary columns; ',' was read as the decimal point for every row.");
    }
}

/// Handle option [1]: load both input files. A file that fails to load is
/// reported and left unloaded; the other one is still usable.
fn handle_load(config: &PipelineConfig, loaded: &mut Loaded) {
    match loader::load_transactions(&config.input.transactions) {
        Ok((records, report)) => {
            print_load_report("transaction", &report);
            loaded.transactions = Some(records);
        }
        Err(e) => eprintln!("Failed to load {}: {}", config.input.transactions.display(), e),
    }
    match loader::load_orders(&config.input.orders) {
        Ok((records, report)) => {
            print_load_report("order", &report);
            loaded.orders = Some(records);
        }
        Err(e) => eprintln!("Failed to load {}: {}", config.input.orders.display(), e),
    }
    println!();
}

fn emit(catalog: &MetricCatalog, out_dir: &Path, preview_rows: usize) {
    let file = out_dir.join(format!("{}.json", catalog.dashboard()));
    if let Err(e) = output::write_json(&file, catalog) {
        error!(error = %e, "failed to write catalog");
        eprintln!("Write error: {}", e);
    }
    for (name, value) in catalog.iter() {
        if let MetricValue::Table(table) = value {
            let path = out_dir.join(format!("{}_{}.csv", catalog.dashboard(), name));
            if let Err(e) = output::write_table_csv(&path, table) {
                error!(error = %e, metric = %name, "failed to write table");
            }
        }
    }
    output::preview_catalog(catalog, preview_rows);
    println!("(Full catalog exported to {})\n", file.display());
}

/// Handle option [2]: run every dashboard whose input is loaded.
fn handle_generate(cli: &Cli, config: &PipelineConfig, loaded: &Loaded) {
    if loaded.transactions.is_none() && loaded.orders.is_none() {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return;
    }
    let now = match parse_now(cli.now.as_deref()) {
        Ok(now) => now,
        Err(e) => {
            eprintln!("{}\n", e);
            return;
        }
    };
    if let Err(e) = std::fs::create_dir_all(&cli.output) {
        eprintln!("Cannot create {}: {}\n", cli.output.display(), e);
        return;
    }
    println!("Generating dashboards (reference time {})...\n", now);
    let selector = WindowSelector::new(now);

    if let Some(records) = &loaded.transactions {
        match reports::ecommerce(records, &selector, config) {
            Ok(catalog) => emit(&catalog, &cli.output, cli.preview_rows),
            Err(e) => eprintln!("Sales and users dashboard failed: {}\n", e),
        }
        match reports::product_performance(records, config) {
            Ok(catalog) => emit(&catalog, &cli.output, cli.preview_rows),
            Err(e) => eprintln!("Product performance dashboard failed: {}\n", e),
        }
    }
    if let Some(orders) = &loaded.orders {
        match reports::customer_satisfaction(orders, config) {
            Ok(catalog) => emit(&catalog, &cli.output, cli.preview_rows),
            Err(e) => eprintln!("Customer satisfaction dashboard failed: {}\n", e),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };

    let mut loaded = Loaded::default();
    let mut input = io::stdin().lock();
    loop {
        println!("Select an option:");
        println!("[1] Load the files");
        println!("[2] Generate Dashboards\n");
        let Some(choice) = read_choice(&mut input) else {
            println!("\nExiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => handle_load(&config, &mut loaded),
            "2" => {
                println!();
                handle_generate(&cli, &config, &loaded);
                if !prompt_back_to_menu(&mut input) {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
}
