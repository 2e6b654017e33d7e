//! Operator CLI surface. Boots an in-process Grace core (see DESIGN.md
//! for why this binary doesn't speak to a remote server) and drives
//! Parliament/Log/Meta Coordinator operations against it.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use grace_core::crypto::Ed25519Signer;
use grace_core::error::GraceError;
use grace_core::log::{ImmutableLog, InMemoryLogStore, LogFilter};
use grace_core::meta::{AnomalyScorer, CycleInputs, MetaCoordinator};
use grace_core::mesh::EventMesh;
use grace_core::parliament::{
    CastVoteRequest, InMemoryMemberStore, InMemorySessionStore, Parliament, VoteChoice,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "grace", about = "Operator console for the Grace control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Parliament {
        #[command(subcommand)]
        action: ParliamentCommand,
    },
    Log {
        #[command(subcommand)]
        action: LogCommand,
    },
    Meta {
        #[command(subcommand)]
        action: MetaCommand,
    },
}

#[derive(Subcommand)]
enum ParliamentCommand {
    Sessions {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        committee: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Session {
        id: Uuid,
    },
    Vote {
        id: Uuid,
        #[arg(long)]
        approve: bool,
        #[arg(long)]
        reject: bool,
        #[arg(long)]
        abstain: bool,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        member: Option<String>,
    },
    Stats,
}

#[derive(Subcommand)]
enum LogCommand {
    Verify {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
    },
}

#[derive(Subcommand)]
enum MetaCommand {
    Cycles {
        #[arg(long, default_value_t = 1)]
        last: usize,
    },
}

struct Core {
    log: Arc<ImmutableLog>,
    parliament: Arc<Parliament>,
    meta: Arc<MetaCoordinator>,
}

fn bootstrap() -> Core {
    let log = Arc::new(ImmutableLog::new(
        Arc::new(InMemoryLogStore::new()),
        Arc::new(Ed25519Signer::generate("log-writer")),
    ));
    let parliament = Arc::new(Parliament::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryMemberStore::new(vec![])),
        log.clone(),
        Arc::new(Ed25519Signer::generate("parliament-votes")),
    ));
    let mesh = EventMesh::spawn(None);
    let meta = MetaCoordinator::new(
        log.clone(),
        mesh,
        Arc::new(Ed25519Signer::generate("meta-coordinator")),
        vec![Arc::new(AnomalyScorer::new(5.0))],
    );
    Core {
        log,
        parliament,
        meta: Arc::new(meta),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let core = bootstrap();

    match run(cli.command, &core).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

async fn run(command: Command, core: &Core) -> Result<(), ExitCode> {
    match command {
        Command::Parliament { action } => run_parliament(action, core).await,
        Command::Log { action } => run_log(action, core).await,
        Command::Meta { action } => run_meta(action, core).await,
    }
}

async fn run_parliament(action: ParliamentCommand, core: &Core) -> Result<(), ExitCode> {
    match action {
        ParliamentCommand::Sessions { status, committee, limit } => {
            let mut sessions = core.parliament.list_sessions().await;
            if let Some(status) = status {
                sessions.retain(|s| format!("{:?}", s.status).to_lowercase() == status.to_lowercase());
            }
            if let Some(committee) = committee {
                sessions.retain(|s| s.committee == committee);
            }
            if let Some(limit) = limit {
                sessions.truncate(limit);
            }
            println!("{}", serde_json::to_string_pretty(&sessions).unwrap());
            Ok(())
        }
        ParliamentCommand::Session { id } => match core.parliament.get_session(id).await {
            Some(session) => {
                println!("{}", serde_json::to_string_pretty(&session).unwrap());
                Ok(())
            }
            None => {
                eprintln!("session {id} not found");
                Err(ExitCode::from(4))
            }
        },
        ParliamentCommand::Vote { id, approve, reject, abstain, reason, member } => {
            let vote = match (approve, reject, abstain) {
                (true, false, false) => VoteChoice::Approve,
                (false, true, false) => VoteChoice::Reject,
                (false, false, true) => VoteChoice::Abstain,
                _ => {
                    eprintln!("exactly one of --approve/--reject/--abstain is required");
                    return Err(ExitCode::from(2));
                }
            };
            let outcome = core
                .parliament
                .cast_vote(CastVoteRequest {
                    session_id: id,
                    member_id: member.unwrap_or_else(|| "operator".to_string()),
                    vote,
                    reason: reason.unwrap_or_default(),
                    automated: false,
                    confidence: None,
                })
                .await;
            match outcome {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome.session).unwrap());
                    Ok(())
                }
                Err(GraceError::NotFound(msg)) => {
                    eprintln!("{msg}");
                    Err(ExitCode::from(4))
                }
                Err(GraceError::Unauthorized(msg)) => {
                    eprintln!("{msg}");
                    Err(ExitCode::from(3))
                }
                Err(err) => {
                    eprintln!("{err}");
                    Err(ExitCode::from(2))
                }
            }
        }
        ParliamentCommand::Stats => {
            let stats = core.parliament.get_statistics().await;
            println!("{}", serde_json::to_string_pretty(&stats).unwrap());
            Ok(())
        }
    }
}

async fn run_log(action: LogCommand, core: &Core) -> Result<(), ExitCode> {
    match action {
        LogCommand::Verify { from, to } => {
            let from = from.unwrap_or(1);
            let entries = core
                .log
                .read(LogFilter {
                    from_seq: Some(from),
                    to_seq: to,
                    ..Default::default()
                })
                .await
                .map_err(|_| ExitCode::from(4))?;
            let to = to.unwrap_or_else(|| entries.last().map(|e| e.seq).unwrap_or(from));
            match core.log.verify(from..=to).await {
                Ok(()) => {
                    println!("chain verified from {from} to {to}");
                    Ok(())
                }
                Err(GraceError::ChainBroken(seq)) => {
                    eprintln!("chain broken at seq {seq}");
                    Err(ExitCode::from(5))
                }
                Err(err) => {
                    eprintln!("{err}");
                    Err(ExitCode::from(2))
                }
            }
        }
    }
}

async fn run_meta(action: MetaCommand, core: &Core) -> Result<(), ExitCode> {
    match action {
        MetaCommand::Cycles { last } => {
            for _ in 0..last {
                match core.meta.run_cycle(CycleInputs::default()).await {
                    Ok(cycle) => println!("{}", serde_json::to_string_pretty(&cycle).unwrap()),
                    Err(err) => {
                        eprintln!("{err}");
                        return Err(ExitCode::from(2));
                    }
                }
            }
            Ok(())
        }
    }
}
