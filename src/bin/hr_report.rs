//! HR Dashboard Reports
//!
//! Runs the page reports from the terminal, against the live sheets or a local
//! `.csv` / `.json` export.
//!
//! Run: ./target/release/hr_report attendance --category Ouvrier
//!      ./target/release/hr_report --file exports/sortie.csv sortie --year 2024
//!      ./target/release/hr_report login --email someone@example.com --password ...

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use hr_dashboard::config::{self, Config};
use hr_dashboard::fetch::{RetryPolicy, SheetClient};
use hr_dashboard::models::Source;
use hr_dashboard::present::NamedValue;
use hr_dashboard::reports::{attendance, performance, recruitment, sector, sortie, turnover, workforce};
use hr_dashboard::session::SessionStore;
use hr_dashboard::table::RecordTable;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hr_report")]
#[command(about = "Print HR dashboard reports from the live sheets or a local export")]
struct Args {
    /// Read the sheet from a .csv or .json export instead of fetching it
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Where the admin session is kept
    #[arg(long, global = true, default_value = ".hr_session.json")]
    session: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Home page figures
    Dashboard,
    /// Attendance by group, contract and category
    Attendance {
        #[arg(long)]
        category: Option<String>,
        /// Group to list the roster of
        #[arg(long)]
        group: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Working hours by group and department
    Performance {
        /// Comma-separated dates
        #[arg(long)]
        dates: Option<String>,
        /// Comma-separated departments
        #[arg(long)]
        departments: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Recruits by department, source and month
    Recruitment {
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        sector: Option<String>,
    },
    /// Exits by QZ, sex, contract and month
    Sortie {
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        contract: Option<String>,
    },
    /// Monthly turnover rates
    Turnover {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        contract: Option<String>,
    },
    /// Headcount by department and contract
    Workforce {
        /// Use the sample sheet when the live one is unreachable
        #[arg(long)]
        fallback: bool,
    },
    /// Roster analytics from a JSON roster file
    Sector {
        roster: PathBuf,
        /// Date ages and open tenures are measured at (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Check credentials against the admin sheet and keep the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the current session
    Whoami,
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_section_header(title: &str) {
    println!("\n{}", "═".repeat(80));
    println!("  {}", title);
    println!("{}\n", "═".repeat(80));
}

fn print_subsection(title: &str) {
    println!("\n{}", title);
    println!("{}", "─".repeat(70));
}

fn print_series(series: &[NamedValue]) {
    if series.is_empty() {
        println!("  (none)");
    }
    for item in series {
        println!("  {:<40} {:>10}", item.name, item.value);
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

// ============================================================================
// Sheet loading
// ============================================================================

fn read_export(path: &Path) -> Result<RecordTable> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            let rows: serde_json::Value = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            Ok(RecordTable::from_value(rows)?)
        }
        _ => RecordTable::from_csv(file),
    }
}

async fn load_table(args: &Args, config: &Config, source: Source) -> Result<RecordTable> {
    if let Some(path) = &args.file {
        return read_export(path);
    }
    let Some(url) = config.source(source).url else {
        bail!("{}_URL is not set and no --file was given", source.env_prefix());
    };
    let rows = SheetClient::new()
        .get_json(&url, source.name(), &RetryPolicy::client())
        .await
        .with_context(|| format!("fetching the {source} sheet"))?;
    Ok(RecordTable::from_value(rows)?)
}

// ============================================================================
// Reports
// ============================================================================

fn show_attendance(report: &attendance::AttendanceReport) {
    print_section_header("ATTENDANCE");

    let overall = &report.overall;
    println!("  Workers counted:        {:>10}", overall.total_workers);
    println!("  Present:                {:>10}  ({}%)", overall.total_present, overall.attendance_rate);
    println!("  Absent:                 {:>10}  ({}%)", overall.total_absent, overall.absence_rate);
    if report.skipped_rows > 0 {
        println!("  Skipped rows:           {:>10}", report.skipped_rows);
    }

    print_subsection(&format!(
        "Groups (page {}/{}, {} groups)",
        report.groups.page, report.groups.total_pages, report.groups.total_rows
    ));
    println!("  {:<30} {:>8} {:>8} {:>8} {:>9}", "Group", "Total", "Present", "Absent", "Rate %");
    for row in &report.groups.items {
        println!(
            "  {:<30} {:>8} {:>8} {:>8} {:>9}",
            row.name, row.total, row.present, row.absent, row.present_rate
        );
    }

    print_subsection("Contracts");
    for row in &report.contract_stats {
        println!("  {:<30} {:>8} {:>8} {:>8} {:>9}", row.name, row.total, row.present, row.absent, row.present_rate);
    }

    if let Some(roster) = &report.roster {
        print_subsection(&format!(
            "Roster of {} ({} present, {} absent)",
            roster.group, roster.present, roster.absent
        ));
        for entry in &roster.records {
            println!("  {:<12} {:<40} {}", entry.code, entry.name, entry.status);
        }
    }
}

fn show_performance(report: &performance::PerformanceReport) {
    print_section_header("PERFORMANCE");
    println!("  Total hours:            {:>10}", report.total_hours);
    println!(
        "  Under 8 hours:          {:>10}  ({}% of {})",
        report.low_hours.count, report.low_hours.percentage, report.low_hours.total
    );

    print_subsection(&format!("Groups (page {}/{})", report.groups.page, report.groups.total_pages));
    println!("  {:<30} {:>10} {:>8} {:>12}", "Group", "Hours", "Workers", "Avg/day");
    for row in &report.groups.items {
        println!(
            "  {:<30} {:>10} {:>8} {:>12}",
            row.name, row.working_hours, row.worker_count, row.avg_daily_workload
        );
    }

    print_subsection("Hours by department");
    for dept in &report.departments {
        println!("  {:<40} {:>10} {:>7}%", dept.name, dept.hours, dept.percentage);
    }

    print_subsection(&format!("AG distribution ({} workers)", report.ag.total_count));
    for ag in &report.ag.distribution {
        println!("  AG {:<37} {:>10}", ag.value, ag.count);
    }
}

fn show_recruitment(report: &recruitment::RecruitmentReport) {
    print_section_header("RECRUITMENT");
    println!("  Total recruits:         {:>10}", report.total_recruits);
    println!("  Temporary:              {:>10}", report.temporary_recruits);
    println!("  Permanent:              {:>10}", report.permanent_recruits);

    print_subsection("Top departments");
    print_series(&report.by_department);
    print_subsection("Sources");
    print_series(&report.by_source);
    print_subsection("Sectors");
    print_series(&report.by_sector);
    print_subsection("By month");
    for month in &report.by_month {
        println!("  {:<40} {:>10}", month.month, month.recruits);
    }
}

fn show_sortie(report: &sortie::SortieReport) {
    print_section_header("SORTIE");
    println!("  Total exits:            {:>10}", report.total_exits);
    println!("  Women:                  {:>10}", report.total_female);
    println!("  Men:                    {:>10}", report.total_male);

    print_subsection("By QZ");
    print_series(&report.by_qz);
    print_subsection("By contract");
    print_series(&report.by_contract);
    print_subsection("Top departments");
    print_series(&report.by_department);
    print_subsection("By month");
    for month in &report.by_month {
        let total: u64 = month.qz.iter().map(|q| q.value).sum();
        println!("  {:<40} {:>10}", month.month, total);
    }
}

fn show_turnover(report: &turnover::TurnoverReport) {
    print_section_header("TURNOVER");
    println!(
        "  {:<20} {:>10} {:>10} {:>12} {:>9}",
        "Month", "Started", "Finished", "Avg staff", "Rate %"
    );
    for month in &report.months {
        println!(
            "  {:<20} {:>10} {:>10} {:>12} {:>9}",
            month.label, month.total_started, month.total_finished, month.average_workforce, month.turnover_rate
        );
    }
}

fn show_workforce(report: &workforce::WorkforceReport) {
    print_section_header("WORKFORCE");
    println!("  Workers:                {:>10}", report.total_workers);
    println!("  Men:                    {:>10}", report.total_men);
    println!("  Women:                  {:>10}", report.total_women);

    print_subsection("Contracts");
    for share in &report.contract_shares {
        println!("  {:<40} {:>10} {:>7}%", share.name, share.value, share.percentage);
    }

    print_subsection("Departments");
    for dept in &report.departments {
        println!("  {:<40} {:>10}", dept.name, dept.total_workers);
        for contract in &dept.contracts {
            println!(
                "      {:<36} {:>10}  (H {} / F {})",
                contract.name, contract.value.total_workers, contract.value.men_count, contract.value.women_count
            );
        }
    }

    print_subsection("Age");
    print_series(&report.age_buckets);
}

fn show_sector(report: &sector::SectorReport) {
    print_section_header(&format!("SECTOR  {} → {}", report.start_date, report.end_date));
    println!("  Workers in range:       {:>10}", report.total_workers);
    println!("  Average age:            {:>10}", report.average_age);
    println!("  Turnover rate:          {:>9}%", report.turnover_rate);
    println!("  Average tenure (days):  {:>10}", report.average_tenure_days);

    print_subsection("Supervisors");
    print_series(&report.supervisors);
    print_subsection("Gender");
    print_series(&report.gender);
    print_subsection("Exit reasons");
    for reason in &report.exit_reasons {
        println!("  {:<40} {:>10}", reason.reason, reason.count);
    }
    print_subsection(&format!("Monthly turnover {}", report.year));
    for month in &report.yearly_turnover {
        println!("  {:<40} {:>9}%", month.month, month.turnover);
    }
    print_subsection("Farms");
    for farm in &report.farms {
        println!(
            "  {:<30} {:>6} active / {:>6} total {:>8} days",
            farm.name, farm.active_workers, farm.total_workers, farm.average_tenure_days
        );
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .init();

    let args = Args::parse();
    let config = config::load()?;

    match &args.command {
        Command::Dashboard => {
            let workforce = load_table(&args, &config, Source::Workforce).await?;
            let attendance = load_table(&args, &config, Source::Attendance).await?;
            let people = workforce::summary(&workforce);
            let presence = attendance::summary(&attendance);
            if args.json {
                return print_json(&serde_json::json!({ "workforce": people, "attendance": presence }));
            }
            print_section_header("HR DASHBOARD");
            println!("  Departments:            {:>10}", people.total_departments);
            println!("  Workers:                {:>10}", people.total_workers);
            println!("  Men / Women:            {:>10}", format!("{} / {}", people.total_men, people.total_women));
            println!("  Average age:            {:>10}", people.average_age);
            println!("  Present today:          {:>10}  ({}%)", presence.total_present, presence.attendance_rate);
            println!("  Absent today:           {:>10}  ({}%)", presence.total_absent, presence.absence_rate);
        }
        Command::Attendance { category, group, page } => {
            let table = load_table(&args, &config, Source::Attendance).await?;
            let filters = attendance::Filters {
                category: category.clone(),
                group: group.clone(),
                group_page: Some(*page),
                ..attendance::Filters::default()
            };
            let report = attendance::build(&table, &filters);
            if args.json {
                return print_json(&report);
            }
            show_attendance(&report);
        }
        Command::Performance { dates, departments, search, page } => {
            let table = load_table(&args, &config, Source::Performance).await?;
            let filters = performance::Filters {
                dates: dates.clone(),
                departments: departments.clone(),
                search: search.clone(),
                page: Some(*page),
                ..performance::Filters::default()
            };
            let report = performance::build(&table, &filters);
            if args.json {
                return print_json(&report);
            }
            show_performance(&report);
        }
        Command::Recruitment { department, source, month, sector } => {
            let table = load_table(&args, &config, Source::Recruitment).await?;
            let filters = recruitment::Filters {
                department: department.clone(),
                source: source.clone(),
                month: month.clone(),
                sector: sector.clone(),
            };
            let report = recruitment::build(&table, &filters);
            if args.json {
                return print_json(&report);
            }
            show_recruitment(&report);
        }
        Command::Sortie { year, month, department, contract } => {
            let table = load_table(&args, &config, Source::Sortie).await?;
            let filters = sortie::Filters {
                year: year.clone(),
                month: month.clone(),
                department: department.clone(),
                contract: contract.clone(),
            };
            let report = sortie::build(&table, &filters);
            if args.json {
                return print_json(&report);
            }
            show_sortie(&report);
        }
        Command::Turnover { month, group, contract } => {
            let table = load_table(&args, &config, Source::Turnover).await?;
            let filters = turnover::Filters {
                month: month.clone(),
                group: group.clone(),
                contract: contract.clone(),
            };
            let report = turnover::build(&table, &filters);
            if args.json {
                return print_json(&report);
            }
            show_turnover(&report);
        }
        Command::Workforce { fallback } => {
            let table = match load_table(&args, &config, Source::Workforce).await {
                Ok(table) => table,
                Err(e) if *fallback => {
                    tracing::warn!(error = %e, "Using the sample workforce sheet");
                    RecordTable::from_value(workforce::fallback_table())?
                }
                Err(e) => return Err(e),
            };
            let report = workforce::build(&table);
            if args.json {
                return print_json(&report);
            }
            show_workforce(&report);
        }
        Command::Sector { roster, as_of } => {
            let file = File::open(roster).with_context(|| format!("cannot open {}", roster.display()))?;
            let request: sector::SectorRequest = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("{} is not a valid roster", roster.display()))?;
            let as_of = as_of
                .or(request.as_of)
                .unwrap_or_else(|| chrono::Utc::now().date_naive());
            let report = sector::build(&request, as_of);
            if args.json {
                return print_json(&report);
            }
            show_sector(&report);
        }
        Command::Login { email, password } => {
            let table = load_table(&args, &config, Source::Auth).await?;
            let mut store = SessionStore::open(&args.session);
            let session = store.login(&table, email, password)?;
            println!("Logged in as {} ({})", session.email, session.permission);
            println!("Admin area: {}", session.permission.admin_path());
        }
        Command::Logout => {
            SessionStore::open(&args.session).logout()?;
            println!("Logged out");
        }
        Command::Whoami => match SessionStore::open(&args.session).current() {
            Some(session) => println!("{} ({}) → {}", session.email, session.permission, session.permission.admin_path()),
            None => println!("Not logged in"),
        },
    }

    Ok(())
}
