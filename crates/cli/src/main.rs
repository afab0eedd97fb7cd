use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use fhir::{Gender, Patient, PatientRecord, RequestedKind, ServerId};
use hb_core::constants::{ENV_SERVER_BASE, ENV_STRICT_KINDS, ENV_TIMEOUT_SECS};
use hb_core::{GatewayConfig, HttpTransport, SubmissionService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hb")]
#[command(about = "HealthBridge: submit health measurements to a FHIR repository")]
struct Cli {
    /// Repository base URL (overrides HB_SERVER_BASE)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a patient and print the id the repository assigned
    RegisterPatient(PatientArgs),
    /// Print the FHIR JSON a patient would be submitted as, without contacting the repository
    RenderPatient(PatientArgs),
    /// Record a measurement for a registered patient
    Record {
        /// Measurement kind: weight, steps or calories-burned
        kind: String,
        /// Measured value (kg, steps or kcal)
        value: f64,
        /// Server id of the registered patient
        #[arg(long)]
        patient_id: String,
        /// Measurement time, or start of the interval (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,
        /// End of the interval (RFC 3339); required for steps and calories burned
        #[arg(long)]
        end: Option<DateTime<Utc>>,
    },
    /// Count patients whose family name matches exactly
    CountFamily {
        /// Family name to search for
        family: String,
    },
}

#[derive(Args)]
struct PatientArgs {
    /// Given name
    given: String,
    /// Family name
    family: String,
    /// Additional given names (repeatable)
    #[arg(long = "middle")]
    middle: Vec<String>,
    /// Address country
    #[arg(long)]
    country: Option<String>,
    /// Address city
    #[arg(long)]
    city: Option<String>,
    /// Address line
    #[arg(long)]
    line: Option<String>,
    /// Address postal code
    #[arg(long)]
    postal_code: Option<String>,
    /// External identifier value (e.g. an MRN)
    #[arg(long)]
    identifier: Option<String>,
    /// Namespace URI of the external identifier
    #[arg(long, requires = "identifier")]
    identifier_system: Option<String>,
    /// Administrative gender: male, female, other or unknown
    #[arg(long)]
    gender: Option<Gender>,
}

impl PatientArgs {
    fn into_record(self) -> anyhow::Result<PatientRecord> {
        let mut record = match (self.country, self.city, self.line, self.postal_code) {
            (Some(country), Some(city), Some(line), Some(postal_code)) => {
                PatientRecord::build_with_address(
                    &self.given,
                    &self.family,
                    &country,
                    &city,
                    &line,
                    &postal_code,
                )?
            }
            (None, None, None, None) => PatientRecord::build(&self.given, &self.family)?,
            _ => bail!("an address needs --country, --city, --line and --postal-code together"),
        };

        for middle in &self.middle {
            record = record.with_given(middle)?;
        }
        if let Some(value) = &self.identifier {
            record = record.with_identifier(self.identifier_system.as_deref(), value)?;
        }
        if let Some(gender) = self.gender {
            record = record.with_gender(gender);
        }

        Ok(record)
    }
}

fn load_config(server_override: Option<String>) -> anyhow::Result<Arc<GatewayConfig>> {
    let server_base = server_override.or_else(|| std::env::var(ENV_SERVER_BASE).ok());
    let cfg = GatewayConfig::from_env_values(
        server_base,
        std::env::var(ENV_TIMEOUT_SECS).ok(),
        std::env::var(ENV_STRICT_KINDS).ok(),
    )?;
    Ok(Arc::new(cfg))
}

fn service(cfg: Arc<GatewayConfig>) -> anyhow::Result<SubmissionService<HttpTransport>> {
    let transport = HttpTransport::new(&cfg)?;
    Ok(SubmissionService::new(cfg, transport))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hb=info".parse()?)
                .add_directive("fhir=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::RegisterPatient(args)) => {
            let record = args.into_record()?;
            let cfg = load_config(cli.server)?;
            tracing::info!(server = cfg.server_base(), "registering patient");

            let patient = service(cfg)?
                .submit_patient(record)
                .context("registering patient")?;
            match patient.server_id() {
                Some(id) => println!("Got Patient ID: {id}"),
                None => bail!("repository accepted the patient but no id was recorded"),
            }
        }
        Some(Commands::RenderPatient(args)) => {
            let record = args.into_record()?;
            println!("{}", Patient::render_json(&record)?);
        }
        Some(Commands::Record {
            kind,
            value,
            patient_id,
            start,
            end,
        }) => {
            let kind = RequestedKind::parse(&kind);
            let patient = PatientRecord::existing(ServerId::new(&patient_id)?);
            let cfg = load_config(cli.server)?;

            let id = service(cfg)?
                .record_measurement(kind.clone(), value, &patient, start, end)
                .with_context(|| format!("recording {kind} for patient {patient_id}"))?;
            println!("Got Observation ID: {id}");
        }
        Some(Commands::CountFamily { family }) => {
            let cfg = load_config(cli.server)?;
            let count = service(cfg)?
                .count_patients_by_family_name(&family)
                .with_context(|| format!("searching patients named '{family}'"))?;
            println!("Found {count} patients named '{family}'");
        }
        None => {
            println!("Use 'hb --help' for commands");
        }
    }

    Ok(())
}
