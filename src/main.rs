use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod catalog;
mod config;
mod db;
mod engine;
mod logger;
mod models;
mod report;
mod scale;

use catalog::SubjectCatalog;
use config::AppConfig;
use models::{GradeSelections, NewStudent, Role, SemesterRecord};
use scale::GradeScale;

#[derive(Parser)]
#[command(name = "cgpa-tracker")]
#[command(about = "Semester GPA and CGPA tracker for student records", long_about = None)]
struct Cli {
    /// Grade scale JSON file (defaults to the built-in scale)
    #[arg(long, global = true)]
    scale: Option<PathBuf>,
    /// Subject catalog CSV file (defaults to the built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students and grades
    Seed,
    /// Register a student, or update one with the same register number
    Register {
        #[arg(long)]
        register_number: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "2024-2028")]
        batch: String,
        #[arg(long)]
        department: String,
    },
    /// Replace one semester's grades for a student
    SaveSemester {
        #[arg(long)]
        register_number: String,
        #[arg(long)]
        semester: u32,
        /// Subject grade as CODE=GRADE; leave GRADE empty for ungraded
        #[arg(long = "grade", value_parser = parse_grade_pair)]
        grades: Vec<(String, String)>,
    },
    /// Import grades from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show semester GPAs, CGPA, and CGPA history for a student
    Results {
        #[arg(long)]
        register_number: String,
    },
    /// Compute a semester GPA without touching the database
    Preview {
        #[arg(long)]
        semester: u32,
        #[arg(long = "grade", value_parser = parse_grade_pair)]
        grades: Vec<(String, String)>,
    },
    /// Show the grade scale in use
    Scale,
    /// List catalog subjects
    Catalog {
        #[arg(long)]
        semester: Option<u32>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        batch: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the results sheet as CSV
    Export {
        #[arg(long)]
        batch: Option<String>,
        #[arg(long, default_value = "Student_Results.csv")]
        out: PathBuf,
    },
    /// Show student counts
    Stats,
    /// Remove a student and all of their records
    DeleteStudent {
        #[arg(long)]
        register_number: String,
    },
    /// Change a student's role
    SetRole {
        #[arg(long)]
        register_number: String,
        #[arg(long, value_enum)]
        role: Role,
    },
}

fn parse_grade_pair(raw: &str) -> Result<(String, String), String> {
    let (code, grade) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=GRADE, got `{raw}`"))?;
    let code = code.trim();
    if code.is_empty() {
        return Err(format!("missing subject code in `{raw}`"));
    }
    Ok((code.to_string(), grade.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?.with_overrides(cli.scale, cli.catalog);
    let scale = config.load_scale()?;
    let catalog = config.load_catalog()?;
    info!(
        scale = scale.version(),
        semesters = catalog.semester_count(),
        "reference data loaded"
    );

    match cli.command {
        Commands::Preview { semester, grades } => {
            let grades: GradeSelections = grades.into_iter().collect();
            let computed = engine::compute_semester_gpa(semester, &grades, &catalog, &scale)?;
            println!(
                "Semester {semester}: GPA {} over {} credits ({} points)",
                engine::format_display(computed.gpa),
                computed.total_credits,
                computed.total_points
            );
        }
        Commands::Scale => {
            println!("Grade scale {}:", scale.version());
            for (grade, _) in scale.grades() {
                println!("- {grade}: {}", engine::grade_to_point(grade, &scale));
            }
        }
        Commands::Catalog { semester } => {
            let semesters: Vec<u32> = match semester {
                Some(value) => vec![value],
                None => catalog.semesters().collect(),
            };
            for number in semesters {
                let subjects = catalog
                    .subjects(number)
                    .with_context(|| format!("semester {number} is not in the catalog"))?;
                println!(
                    "Semester {number} ({} credits):",
                    catalog.semester_credits(number)
                );
                for subject in subjects {
                    println!("- {} {} ({} credits)", subject.code, subject.name, subject.credits);
                }
            }
        }
        command => {
            let pool = connect(&config).await?;
            run_db_command(command, &pool, &catalog, &scale).await?;
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn run_db_command(
    command: Commands,
    pool: &PgPool,
    catalog: &SubjectCatalog,
    scale: &GradeScale,
) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(pool, catalog, scale).await?;
            println!("Seed data inserted.");
        }
        Commands::Register {
            register_number,
            name,
            email,
            batch,
            department,
        } => {
            let student = NewStudent {
                register_number,
                full_name: name,
                email,
                batch,
                department,
            };
            db::upsert_student(pool, &student).await?;
            println!("Registered {} ({}).", student.full_name, student.register_number);
        }
        Commands::SaveSemester {
            register_number,
            semester,
            grades,
        } => {
            let student = db::find_student(pool, &register_number)
                .await?
                .with_context(|| format!("no student with register number {register_number}"))?;
            let record = SemesterRecord::new(semester, grades.into_iter().collect());
            let result = db::save_semester(pool, student.id, &record, catalog, scale).await?;
            let gpa = result.semester_gpa.get(&semester).copied().unwrap_or(0.0);
            println!(
                "Semester {semester} saved: GPA {}, CGPA {}.",
                engine::format_display(gpa),
                engine::format_display(result.cgpa)
            );
        }
        Commands::Import { csv } => {
            let saved = db::import_csv(pool, &csv, catalog, scale).await?;
            println!("Saved {saved} semesters from {}.", csv.display());
        }
        Commands::Results { register_number } => {
            let student = db::find_student(pool, &register_number)
                .await?
                .with_context(|| format!("no student with register number {register_number}"))?;
            let semesters = db::fetch_semesters(pool, student.id).await?;
            let result = engine::compute_results(&semesters, catalog, scale)?;

            println!(
                "{} ({}, {} {})",
                student.full_name, student.register_number, student.department, student.batch
            );
            if result.semester_gpa.is_empty() {
                println!("No grades entered yet.");
                return Ok(());
            }
            for (semester, gpa) in &result.semester_gpa {
                let credits = result.semester_credits.get(semester).copied().unwrap_or(0);
                println!(
                    "- Semester {semester}: GPA {} over {credits} credits",
                    engine::format_or_na(*gpa)
                );
            }
            println!(
                "CGPA {} over {} credits",
                engine::format_or_na(result.cgpa),
                result.total_credits
            );

            let history = db::fetch_cgpa_history(pool, student.id).await?;
            if !history.is_empty() {
                println!("CGPA history:");
                for snapshot in history.iter().take(5) {
                    println!(
                        "- {} after {} semesters on {}",
                        engine::format_display(snapshot.cgpa),
                        snapshot.completed_semesters,
                        snapshot.recorded_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Commands::Report { batch, out } => {
            let records = db::fetch_student_records(pool, batch.as_deref()).await?;
            let summaries = report::summarize_all(&records, catalog, scale)?;
            let report = report::build_report(batch.as_deref(), scale, &summaries);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { batch, out } => {
            let records = db::fetch_student_records(pool, batch.as_deref()).await?;
            let summaries = report::summarize_all(&records, catalog, scale)?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::export_csv(&summaries, catalog.semester_count(), file)?;
            println!("Exported {} students to {}.", summaries.len(), out.display());
        }
        Commands::Stats => {
            let stats = db::fetch_stats(pool).await?;
            println!("Students: {} ({} in the last 30 days)", stats.total, stats.recent);
            for entry in &stats.by_batch {
                println!("- {}: {}", entry.batch, entry.count);
            }
        }
        Commands::DeleteStudent { register_number } => {
            if db::delete_student(pool, &register_number).await? {
                println!("Deleted {register_number}.");
            } else {
                println!("No student with register number {register_number}.");
            }
        }
        Commands::SetRole {
            register_number,
            role,
        } => {
            if db::update_role(pool, &register_number, role).await? {
                println!("{register_number} is now {}.", role.as_str());
            } else {
                println!("No student with register number {register_number}.");
            }
        }
        Commands::Preview { .. } | Commands::Scale | Commands::Catalog { .. } => {
            unreachable!("offline commands are handled in main before connecting")
        }
    }

    Ok(())
}
