//! `classpoint` - CLI for classroom boards
//!
//! This binary runs a board session and provides commands for inspecting
//! the shared board collection and the timetable.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::Parser;

use classpoint::attendance::{parse_date, parse_month, AttendanceStatus, MonthReport};
use classpoint::board::{select_destination, BoardRecord};
use classpoint::cli::{
    AttendanceCommand, BoardCommand, Cli, Command, ConfigCommand, OutputFormat, PublishCommand, RunCommand,
    ScheduleCommand, WhereisCommand,
};
use classpoint::schedule::{ScheduleTicker, SystemClock};
use classpoint::store::{open_attendance, open_configured, SharedStore, TeacherFilter};
use classpoint::timetable::{
    current_class, is_within_reminder_time, next_class, remaining_classes, ClockTime, Day,
    Timetable,
};
use classpoint::{init_logging, BoardSession, Config, PresencePublisher};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Run(cmd) => handle_run(&config, cmd).await,
        Command::Publish(cmd) => handle_publish(&config, cmd).await,
        Command::Whereis(cmd) => handle_whereis(&config, cmd).await,
        Command::Schedule(cmd) => handle_schedule(&config, cmd),
        Command::Board(cmd) => handle_board(&config, cmd).await,
        Command::Attendance(cmd) => handle_attendance(&config, cmd).await,
        Command::Status(cmd) => handle_status(&config, cmd.json).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn resolve_board_id(config: &Config, flag: Option<String>) -> Result<String> {
    match flag {
        Some(id) => Ok(id),
        None => Ok(config
            .board_id()
            .context("no board id; pass --board or set board.id")?
            .to_string()),
    }
}

fn resolve_section(config: &Config, flag: Option<String>) -> Result<String> {
    flag.or_else(|| config.board.section.clone())
        .context("no section; pass --section or set board.section")
}

fn load_timetable(config: &Config, flag: Option<PathBuf>) -> Result<Timetable> {
    let path = flag.unwrap_or_else(|| config.timetable_path());
    Timetable::load(&path).with_context(|| format!("loading timetable {}", path.display()))
}

async fn handle_run(config: &Config, cmd: RunCommand) -> Result<()> {
    let board_id = resolve_board_id(config, cmd.board)?;
    let display_name = config.display_name_for(&board_id).to_string();
    let section = resolve_section(config, cmd.section)?;
    let timetable = load_timetable(config, cmd.timetable)?;

    let store = open_configured(config, true)?;
    let ticker = ScheduleTicker::new(
        Arc::new(SystemClock),
        timetable,
        section,
        config.ticker_config(),
    );
    let handle = BoardSession::new(store, board_id, display_name, ticker)?.spawn();

    let mut destination = handle.destination();
    let mut schedule = handle.schedule();
    print_snapshot(&schedule.borrow_and_update());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = schedule.changed() => {
                if changed.is_err() {
                    break;
                }
                print_snapshot(&schedule.borrow_and_update());
            }
            changed = destination.changed() => {
                if changed.is_err() {
                    break;
                }
                match handle.alert() {
                    Some(alert) => println!(">> {alert}"),
                    None => println!(">> (no alert)"),
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_snapshot(snapshot: &classpoint::ScheduleSnapshot) {
    let describe = |p: Option<&classpoint::timetable::ClassPeriod>| {
        p.map_or_else(
            || "-".to_string(),
            |p| format!("{} ({}) {}-{}", p.subject, p.teacher, p.start_time, p.end_time),
        )
    };
    println!(
        "[{} {}] now: {}  next: {}{}",
        snapshot.section,
        snapshot.day,
        describe(snapshot.current.as_ref()),
        describe(snapshot.next.as_ref()),
        if snapshot.reminder_due { "  (starting soon)" } else { "" }
    );
}

async fn handle_publish(config: &Config, cmd: PublishCommand) -> Result<()> {
    let board_id = resolve_board_id(config, cmd.board)?;
    let display_name = config.display_name_for(&board_id).to_string();

    let store = open_configured(config, false)?;
    let publisher = PresencePublisher::new(store, board_id, display_name)?;
    let record = publisher.publish_expected(cmd.teacher.as_deref()).await?;

    println!(
        "{} now expects {}",
        record.board_id,
        record.expected_teacher_name.as_deref().unwrap_or("nobody")
    );
    Ok(())
}

async fn handle_whereis(config: &Config, cmd: WhereisCommand) -> Result<()> {
    let store = open_configured(config, false)?;
    let records = store.query(&TeacherFilter::new(&cmd.teacher)).await?;
    let destination = select_destination(&records, &cmd.teacher);

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&destination)?),
        OutputFormat::Plain | OutputFormat::Table => match destination {
            Some(dest) => println!("{}", dest.alert_message()),
            None => println!("No board is expecting {}", cmd.teacher),
        },
    }
    Ok(())
}

fn handle_schedule(config: &Config, cmd: ScheduleCommand) -> Result<()> {
    let section = resolve_section(config, cmd.section)?;
    let timetable = load_timetable(config, cmd.timetable)?;

    let now = Local::now().naive_local();
    let time = match cmd.at {
        Some(at) => at.parse::<ClockTime>()?,
        None => ClockTime::from_time(now.time()),
    };
    let day = Day::from(now.weekday());
    let schedule = timetable.day_schedule(&section, day);

    let current = current_class(schedule, time);
    let next = next_class(schedule, time);
    let remaining = remaining_classes(schedule, time);

    if cmd.format == OutputFormat::Json {
        let report = serde_json::json!({
            "section": section,
            "day": day,
            "time": time,
            "current": current,
            "next": next,
            "remaining": remaining,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{section} - {day} {time}");
    println!("{}", "-".repeat(40));
    if schedule.is_empty() {
        println!("No classes today.");
        return Ok(());
    }
    for period in schedule {
        let marker = if Some(period) == current {
            ">"
        } else if Some(period) == next {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}-{}  {:<16} {:<16} {}",
            period.start_time,
            period.end_time,
            period.subject,
            period.teacher,
            period.location.as_deref().unwrap_or("")
        );
    }
    println!();
    println!("Remaining today: {}", remaining.len());
    if let Some(next) = next {
        if is_within_reminder_time(next.start_time, time, config.schedule.reminder_minutes) {
            println!("{} starts at {}.", next.subject, next.start_time);
        }
    }
    Ok(())
}

async fn handle_board(config: &Config, cmd: BoardCommand) -> Result<()> {
    let store = open_configured(config, false)?;

    match cmd {
        BoardCommand::Register {
            owner,
            name,
            location,
        } => {
            let record = store.register(&owner, &name, &location).await?;
            println!("Registered {} as {}", name, record.board_id);
        }
        BoardCommand::List { owner, format } => {
            let records = match owner {
                Some(owner) => store.boards_owned_by(&owner).await?,
                None => store.list().await?,
            };
            print_boards(&records, format)?;
        }
        BoardCommand::Show { board_id } => {
            let Some(record) = store.get(&board_id).await? else {
                bail!("board not found: {board_id}");
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        BoardCommand::Connect { board_id, owner } => {
            let record = store.connect(&board_id, &owner).await?;
            println!(
                "Connected to {} ({})",
                record.display_name.as_deref().unwrap_or(&record.board_id),
                record.location.as_deref().unwrap_or("no location")
            );
        }
        BoardCommand::Remove { board_id } => {
            if store.delete(&board_id).await? {
                println!("Removed {board_id}");
            } else {
                bail!("board not found: {board_id}");
            }
        }
    }
    Ok(())
}

fn print_boards(records: &[BoardRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Plain => {
            for record in records {
                println!("{}", record.board_id);
            }
        }
        OutputFormat::Table => {
            println!("{:<38} {:<20} {:<20}", "BOARD", "NAME", "EXPECTS");
            for record in records {
                println!(
                    "{:<38} {:<20} {:<20}",
                    record.board_id,
                    record.display_name.as_deref().unwrap_or("-"),
                    record.expected_teacher_name.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn date_or_today(date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(date) => Ok(parse_date(&date)?),
        None => Ok(Local::now().date_naive()),
    }
}

async fn handle_attendance(config: &Config, cmd: AttendanceCommand) -> Result<()> {
    let store = open_attendance(config)?;

    match cmd {
        AttendanceCommand::Students { section, format } => {
            let section = resolve_section(config, section)?;
            let students = store.students(&section).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&students)?),
                OutputFormat::Plain | OutputFormat::Table => {
                    if students.is_empty() {
                        println!("No students in {section}.");
                    }
                    for student in &students {
                        println!("{:<38} {}", student.id, student.name);
                    }
                }
            }
        }
        AttendanceCommand::AddStudent { name, section } => {
            let section = resolve_section(config, section)?;
            let student = store.add_student(&section, &name).await?;
            println!("Added {} to {section} as {}", student.name, student.id);
        }
        AttendanceCommand::RemoveStudent {
            student_id,
            section,
        } => {
            let section = resolve_section(config, section)?;
            if !store.remove_student(&section, &student_id).await? {
                bail!("student not found in {section}: {student_id}");
            }
            println!("Removed {student_id} from {section}");
        }
        AttendanceCommand::Mark {
            student_id,
            status,
            date,
            section,
        } => {
            let section = resolve_section(config, section)?;
            let status: AttendanceStatus = status.parse()?;
            let date = date_or_today(date)?;
            let sheet = store.mark(&section, date, &student_id, status).await?;
            println!(
                "{student_id} marked {status} on {date} ({} present, {} absent)",
                sheet.count(AttendanceStatus::Present),
                sheet.count(AttendanceStatus::Absent)
            );
        }
        AttendanceCommand::Show {
            date,
            section,
            format,
        } => {
            let section = resolve_section(config, section)?;
            let date = date_or_today(date)?;
            let sheet = store.sheet(&section, date).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&sheet)?);
                return Ok(());
            }
            println!("{section} - {date}");
            println!("{}", "-".repeat(40));
            for student in store.students(&section).await? {
                let mark = sheet.status(&student.id).map_or("-", AttendanceStatus::as_str);
                println!("{:<24} {mark}", student.name);
            }
        }
        AttendanceCommand::Reset { date, section } => {
            let section = resolve_section(config, section)?;
            let date = parse_date(&date)?;
            if store.reset_day(&section, date).await? {
                println!("Cleared attendance for {section} on {date}");
            } else {
                println!("No attendance recorded for {section} on {date}");
            }
        }
        AttendanceCommand::Report {
            month,
            section,
            format,
        } => {
            let section = resolve_section(config, section)?;
            let (year, month) = match month {
                Some(month) => parse_month(&month)?,
                None => {
                    let today = Local::now().date_naive();
                    (today.year(), today.month())
                }
            };
            let report = store.month_report(&section, year, month).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Plain | OutputFormat::Table => print_month_report(&report),
            }
        }
    }
    Ok(())
}

fn print_month_report(report: &MonthReport) {
    println!("{} - {}-{:02}", report.section, report.year, report.month);
    let header: String = report.days.iter().map(|d| format!("{:>3}", d.day())).collect();
    println!("{:<24}{header}    P   A", "");
    for row in &report.rows {
        let marks: String = row
            .marks
            .iter()
            .map(|m| format!("{:>3}", m.map_or('-', AttendanceStatus::letter)))
            .collect();
        println!("{:<24}{marks}  {:>2}  {:>2}", row.name, row.present, row.absent);
    }
}

async fn handle_status(config: &Config, json: bool) -> Result<()> {
    let store: SharedStore = open_configured(config, false)?;
    let boards = store.list().await?;
    let own = match &config.board.id {
        Some(id) => store.get(id).await?,
        None => None,
    };

    if json {
        let status = serde_json::json!({
            "board_id": config.board.id,
            "section": config.board.section,
            "backend": config.store.backend,
            "database_path": config.database_path(),
            "boards": boards.len(),
            "record": own,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("classpoint status");
        println!("-----------------");
        println!(
            "Board:         {}",
            config.board.id.as_deref().unwrap_or("(not set)")
        );
        println!(
            "Section:       {}",
            config.board.section.as_deref().unwrap_or("(not set)")
        );
        println!("Backend:       {:?}", config.store.backend);
        println!("Database:      {}", config.database_path().display());
        println!("Boards:        {}", boards.len());
        if let Some(record) = own {
            println!(
                "Expects:       {}",
                record.expected_teacher_name.as_deref().unwrap_or("nobody")
            );
            if let Some(ts) = record.last_updated {
                println!("Last update:   {}", ts.to_rfc3339());
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Board]");
                println!(
                    "  Id:                 {}",
                    config.board.id.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "  Display name:       {}",
                    config.display_name().unwrap_or("(not set)")
                );
                println!(
                    "  Section:            {}",
                    config.board.section.as_deref().unwrap_or("(not set)")
                );
                println!();
                println!("[Schedule]");
                println!("  Timetable:          {}", config.timetable_path().display());
                println!("  Tick (secs):        {}", config.schedule.tick_interval_secs);
                println!("  Reminder (mins):    {}", config.schedule.reminder_minutes);
                println!();
                println!("[Store]");
                println!("  Backend:            {:?}", config.store.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Change poll (ms):   {}", config.store.change_poll_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
