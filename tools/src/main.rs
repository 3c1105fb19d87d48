//! desk-runner: headless host for the rule-change desk.
//!
//! Usage:
//!   desk-runner --db desk.db --facts facts.json
//!   desk-runner --db desk.db --ipc-mode

use anyhow::{Context, Result};
use rulewatch_core::{
    clock::SystemClock,
    collaborator::RuleCompiler,
    command::SuggestionOp,
    config::DeskConfig,
    error::{DeskError, DeskResult},
    fact::TransactionFact,
    lifecycle::{Collaborators, LifecycleController},
    risk_engine::{RiskEngine, Severity},
    store::DeskStore,
    suggestion::{RegulatoryUpdate, SuggestionStatus},
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    Evaluate { fact: TransactionFact },
    IngestUpdate { update: RegulatoryUpdate },
    IngestFact { fact: TransactionFact },
    SeedRule { rule_id: String, text: String },
    Propose { update_id: String },
    Op { op: SuggestionOp },
    Get { suggestion_id: String },
    List {
        #[serde(default)]
        status: Option<SuggestionStatus>,
    },
    Quit,
}

/// Stands in for the downstream rule compiler: every compile yields a fresh
/// artifact id.
struct ArtifactCompiler;

impl RuleCompiler for ArtifactCompiler {
    fn compile(&self, rule_id: &str, text: &str) -> DeskResult<String> {
        if text.trim().is_empty() {
            return Err(DeskError::RuleText(format!("{rule_id}: nothing to compile")));
        }
        let artifact = format!("artifact-{}", uuid::Uuid::new_v4());
        log::debug!("Compiled {rule_id} into {artifact}");
        Ok(artifact)
    }
}

struct Desk {
    store:      Arc<DeskStore>,
    engine:     RiskEngine,
    controller: LifecycleController,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = arg_str(&args, "--db").unwrap_or(":memory:");
    let data_dir = arg_str(&args, "--data-dir").unwrap_or("./data");
    let facts_path = arg_str(&args, "--facts");
    let top = parse_arg(&args, "--top", 10usize);

    if !ipc_mode {
        println!("Rule-change desk: desk-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = DeskConfig::load(data_dir)?;
    let store = Arc::new(DeskStore::open(db)?);
    store.migrate()?;

    let collab = Collaborators::from_store(
        store.clone(),
        Arc::new(ArtifactCompiler),
        Arc::new(SystemClock),
        &config.lifecycle,
    );
    let desk = Desk {
        store,
        engine: RiskEngine::new(config.risk.clone()),
        controller: LifecycleController::new(collab, config.lifecycle.clone()),
    };

    if ipc_mode {
        run_ipc_loop(&desk)?;
    } else if let Some(path) = facts_path {
        let facts = load_facts(path)?;
        for fact in &facts {
            desk.store.insert_fact(fact)?;
        }
        print_summary(&desk, &facts, top);
    } else {
        println!("Nothing to do: pass --facts <file> or --ipc-mode");
    }

    Ok(())
}

fn run_ipc_loop(desk: &Desk) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                let err_json = serde_json::json!({
                    "error": "invalid_request",
                    "message": e.to_string(),
                });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(request, IpcRequest::Quit) {
            break;
        }

        let reply = match handle_request(desk, request) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Request failed: {e}");
                serde_json::json!({ "error": e.kind(), "message": e.to_string() })
            }
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_request(desk: &Desk, request: IpcRequest) -> DeskResult<serde_json::Value> {
    let value = match request {
        IpcRequest::Evaluate { fact } => serde_json::to_value(desk.engine.evaluate(&fact))?,
        IpcRequest::IngestUpdate { update } => {
            let inserted = desk.store.insert_update(&update)?;
            serde_json::json!({ "inserted": inserted })
        }
        IpcRequest::IngestFact { fact } => {
            let inserted = desk.store.insert_fact(&fact)?;
            serde_json::json!({ "inserted": inserted })
        }
        IpcRequest::SeedRule { rule_id, text } => {
            let version = desk
                .store
                .insert_rule_version(&rule_id, &text, &chrono::Utc::now())?;
            serde_json::to_value(version)?
        }
        IpcRequest::Propose { update_id } => {
            serde_json::to_value(desk.controller.create_from_update(&update_id)?)?
        }
        IpcRequest::Op { op } => serde_json::to_value(desk.controller.apply(op)?)?,
        IpcRequest::Get { suggestion_id } => {
            serde_json::to_value(desk.controller.get(&suggestion_id)?)?
        }
        IpcRequest::List { status } => serde_json::to_value(desk.controller.list(status)?)?,
        IpcRequest::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn load_facts(path: &str) -> Result<Vec<TransactionFact>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    let facts: Vec<TransactionFact> =
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;
    Ok(facts)
}

fn print_summary(desk: &Desk, facts: &[TransactionFact], top: usize) {
    let ranked = desk.engine.rank(facts);

    let count = |sev: Severity| ranked.iter().filter(|(_, a)| a.severity == sev).count();

    println!("=== RISK SUMMARY ===");
    println!("  transactions:   {}", ranked.len());
    println!("  critical:       {}", count(Severity::Critical));
    println!("  high:           {}", count(Severity::High));
    println!("  medium:         {}", count(Severity::Medium));
    println!("  low:            {}", count(Severity::Low));

    println!();
    println!("=== TOP {top} ===");
    if ranked.is_empty() {
        println!("  (No transactions)");
    }
    for (id, assessment) in ranked.iter().take(top) {
        let hits: Vec<&str> = assessment.rule_hits.iter().map(|h| h.id.as_str()).collect();
        println!(
            "  {id} | {:>3} | {:<8} | {}",
            assessment.risk_score,
            assessment.severity.as_str(),
            hits.join(", ")
        );
    }
}

fn arg_str<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
