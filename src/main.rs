use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use triage_engine::assessment::Demographics;
use triage_engine::config::{self, TriageConfig};
use triage_engine::health::{HealthDataProvider, JsonFileHealthData, StaticHealthData};
use triage_engine::vitals_risk::{critical_findings, has_critical_vitals, vitals_severity_boost};
use triage_engine::{AssessmentRequest, TriageError, TriageOrchestrator, VitalsSnapshot};

/// Triage decision engine.
#[derive(Parser)]
#[command(name = "triage-engine", version, about = "Symptom and vitals triage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess symptoms (and optional vitals) with the configured AI provider
    Assess {
        /// Free-text symptom description
        #[arg(long)]
        symptoms: String,

        #[command(flatten)]
        vitals: VitalsArgs,

        /// Wearable export (one snapshot or an array); used when no vitals flags are given
        #[arg(long)]
        vitals_file: Option<PathBuf>,

        #[arg(long)]
        age: Option<u32>,

        #[arg(long)]
        sex: Option<String>,

        /// Config file (defaults to the user config directory)
        #[arg(long = "config")]
        config_file: Option<PathBuf>,
    },

    /// Score vitals locally without calling any provider
    Vitals {
        #[command(flatten)]
        vitals: VitalsArgs,
    },
}

#[derive(Args)]
struct VitalsArgs {
    /// Beats per minute
    #[arg(long)]
    heart_rate: Option<u32>,

    /// "systolic/diastolic", e.g. 120/80
    #[arg(long)]
    blood_pressure: Option<String>,

    /// Degrees Fahrenheit
    #[arg(long)]
    temperature: Option<f64>,

    /// Oxygen saturation, percent
    #[arg(long)]
    spo2: Option<f64>,

    /// Breaths per minute
    #[arg(long)]
    respiratory_rate: Option<u32>,
}

impl VitalsArgs {
    fn is_empty(&self) -> bool {
        self.heart_rate.is_none()
            && self.blood_pressure.is_none()
            && self.temperature.is_none()
            && self.spo2.is_none()
            && self.respiratory_rate.is_none()
    }

    fn to_snapshot(&self) -> Option<VitalsSnapshot> {
        if self.is_empty() {
            return None;
        }
        let mut snapshot = VitalsSnapshot::now().with_device_source("cli");
        if let Some(bpm) = self.heart_rate {
            snapshot = snapshot.with_heart_rate(bpm);
        }
        if let Some(bp) = &self.blood_pressure {
            snapshot = snapshot.with_blood_pressure(bp.clone());
        }
        if let Some(temp) = self.temperature {
            snapshot = snapshot.with_temperature(temp);
        }
        if let Some(spo2) = self.spo2 {
            snapshot = snapshot.with_oxygen_saturation(spo2);
        }
        if let Some(rr) = self.respiratory_rate {
            snapshot = snapshot.with_respiratory_rate(rr);
        }
        Some(snapshot)
    }
}

fn main() {
    let cli = Cli::parse();
    triage_engine::init_tracing();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match cli.command {
        Commands::Assess {
            symptoms,
            vitals,
            vitals_file,
            age,
            sex,
            config_file,
        } => {
            let mut demographics = Demographics::new();
            if let Some(age) = age {
                demographics.insert("age".into(), age.to_string());
            }
            if let Some(sex) = sex {
                demographics.insert("sex".into(), sex);
            }

            let health: Arc<dyn HealthDataProvider> = match (vitals.to_snapshot(), vitals_file) {
                (Some(snapshot), _) => Arc::new(StaticHealthData::new(Some(snapshot))),
                (None, Some(path)) => Arc::new(JsonFileHealthData::new(path)),
                (None, None) => Arc::new(StaticHealthData::new(None)),
            };

            let mut request = AssessmentRequest::new(symptoms).retrieving_vitals();
            if !demographics.is_empty() {
                request = request.with_demographics(demographics);
            }

            cmd_assess(config_file.as_deref(), health, request);
        }
        Commands::Vitals { vitals } => cmd_vitals(&vitals),
    }
}

fn cmd_assess(
    config_path: Option<&std::path::Path>,
    health: Arc<dyn HealthDataProvider>,
    request: AssessmentRequest,
) {
    let config = match TriageConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    let client = match config.build_client() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    let orchestrator = TriageOrchestrator::new(client).with_health_data(health);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(2);
        }
    };

    match rt.block_on(orchestrator.assess(request)) {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        },
        Err(TriageError::Assessment(e)) => {
            eprintln!("{}: {}", e.kind(), e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn cmd_vitals(args: &VitalsArgs) {
    let Some(snapshot) = args.to_snapshot() else {
        eprintln!("error: no vitals given");
        process::exit(2);
    };

    let report = serde_json::json!({
        "criticalVitals": has_critical_vitals(&snapshot),
        "criticalFindings": critical_findings(&snapshot),
        "severityBoost": vitals_severity_boost(&snapshot),
        "vitals": snapshot,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
