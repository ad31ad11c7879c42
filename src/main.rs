use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use casey_rides_lib::cancel::CancellationToken;
use casey_rides_lib::commands::{self, import, sync, workouts, AppState, CommandError};
use casey_rides_lib::config::Config;
use casey_rides_lib::store::{Classify, NewWorkout};
use casey_rides_lib::zones::ZoneId;

#[derive(Parser)]
#[command(name = "casey-rides")]
#[command(about = "Cycling training tracker: zone progression levels, training load and backup sync")]
struct Cli {
  #[command(subcommand)]
  command: Command,

  /// Enable debug logging
  #[arg(long, short = 'v', global = true)]
  verbose: bool,
}

#[derive(Subcommand)]
enum Command {
  /// Training loads, insights, recent level changes and rides to classify
  Status,

  /// Markdown summary for pasting into an analysis tool
  Report,

  /// Print all data as JSON
  Export,

  /// Log a ride and update the zone level
  Log {
    /// Zone id (recovery, endurance, tempo, sweetspot, threshold, vo2max, anaerobic)
    #[arg(long)]
    zone: ZoneId,

    /// Workout difficulty level (1-10)
    #[arg(long)]
    level: f64,

    /// Perceived exertion (1-10)
    #[arg(long)]
    rpe: f64,

    /// Duration in minutes
    #[arg(long)]
    duration: f64,

    /// Normalized power in watts
    #[arg(long)]
    np: f64,

    /// Ride date, YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<String>,

    /// The workout was not completed
    #[arg(long)]
    missed: bool,

    #[arg(long, default_value = "")]
    notes: String,
  },

  /// Assign zone and effort to an imported ride
  Classify {
    id: i64,

    #[arg(long)]
    zone: ZoneId,

    #[arg(long)]
    level: f64,

    #[arg(long)]
    rpe: f64,

    #[arg(long)]
    missed: bool,
  },

  /// Delete a ride (levels are not rewound)
  Delete { id: i64 },

  /// Set FTP in watts
  Ftp { watts: f64 },

  /// Import rides from intervals.icu
  Import,

  /// Import a JSON data document or an activity CSV (stdin when no file)
  Paste { file: Option<PathBuf> },

  /// Sync with the Google Drive backup
  Sync,
}

fn read_input(file: Option<PathBuf>) -> std::io::Result<String> {
  match file {
    Some(path) => std::fs::read_to_string(path),
    None => {
      let mut raw = String::new();
      std::io::stdin().read_to_string(&mut raw)?;
      Ok(raw)
    }
  }
}

async fn run(command: Command, state: &AppState) -> Result<String, CommandError> {
  let today = chrono::Local::now().date_naive();

  match command {
    Command::Status => commands::get_status(state, today).await,
    Command::Report => Ok(state.store.read(|s| s.report(today)).await),
    Command::Export => commands::export_data(state).await,
    Command::Log {
      zone,
      level,
      rpe,
      duration,
      np,
      date,
      missed,
      notes,
    } => {
      let workout = NewWorkout {
        date: date.unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
        zone,
        workout_level: level,
        rpe,
        completed: !missed,
        duration,
        normalized_power: np,
        notes,
      };
      workouts::log_workout(state, workout).await
    }
    Command::Classify {
      id,
      zone,
      level,
      rpe,
      missed,
    } => {
      let classify = Classify {
        zone,
        workout_level: level,
        rpe,
        completed: !missed,
      };
      workouts::classify_workout(state, id, classify).await
    }
    Command::Delete { id } => workouts::delete_workout(state, id).await,
    Command::Ftp { watts } => workouts::set_ftp(state, watts).await,
    Command::Import => {
      let cancel = CancellationToken::new();
      let on_interrupt = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          tracing::warn!("Interrupted, finishing the current activity");
          on_interrupt.cancel();
        }
      });
      import::import_intervals(state, &cancel).await
    }
    Command::Paste { file } => {
      let raw = read_input(file)?;
      import::import_paste(state, &raw).await
    }
    Command::Sync => {
      let coordinator = sync::drive_coordinator(&state.config)?;
      sync::sync_backup(state, &coordinator).await
    }
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  casey_rides_lib::init_logging(cli.verbose);

  let state = match Config::from_env() {
    Ok(config) => AppState::open(config).await,
    Err(e) => Err(e.into()),
  };
  let state = match state {
    Ok(state) => state,
    Err(e) => {
      eprintln!("Failed to start: {}", e);
      return ExitCode::FAILURE;
    }
  };

  match run(cli.command, &state).await {
    Ok(message) => {
      println!("{}", message);
      ExitCode::SUCCESS
    }
    Err(e) => {
      eprintln!("{}", e);
      ExitCode::FAILURE
    }
  }
}
