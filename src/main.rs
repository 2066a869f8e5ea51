use anyhow::{anyhow, Result};
use readalong::conversation::StaticCredential;
use readalong::integration::{
    OrchestratorBuilder, OrchestratorCommand, OrchestratorEvent, ReadalongConfig,
};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: play | pause | seek <percent> | word <index> | jump <section> | \
                    scroll | reset | talk | hush | status | quit";

fn parse_command(line: &str) -> Result<Option<OrchestratorCommand>> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();

    let command = match verb {
        "play" => OrchestratorCommand::Play,
        "pause" => OrchestratorCommand::Pause,
        "seek" => OrchestratorCommand::SeekToPercentage(
            arg.ok_or_else(|| anyhow!("seek needs a percentage"))?.parse()?,
        ),
        "word" => OrchestratorCommand::SeekToWord(
            arg.ok_or_else(|| anyhow!("word needs an index"))?.parse()?,
        ),
        "jump" => OrchestratorCommand::JumpToSegment(
            arg.ok_or_else(|| anyhow!("jump needs a section number"))?.parse()?,
        ),
        "scroll" => OrchestratorCommand::ManualScroll,
        "reset" => OrchestratorCommand::Reset,
        "talk" => OrchestratorCommand::StartConversation,
        "hush" => OrchestratorCommand::StopConversation,
        "quit" | "exit" => OrchestratorCommand::Shutdown,
        other => return Err(anyhow!("unknown command '{}'", other)),
    };
    Ok(Some(command))
}

fn print_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Word {
            global,
            progress,
            auto_scroll,
        } => {
            let scroll = if *auto_scroll { " (scroll)" } else { "" };
            println!("word {} {:.1}%{}", global, progress, scroll);
        }
        OrchestratorEvent::SectionStarted(id) => println!("section {}", id),
        OrchestratorEvent::ScrollTo(id) => println!("companion scrolled to {}", id),
        OrchestratorEvent::Connection(status) => println!("companion {:?}", status),
        OrchestratorEvent::Error(message) => println!("error: {}", message),
        other => println!("{:?}", other),
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readalong=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting readalong");

    let config = ReadalongConfig::from_env()?;
    config.validate().map_err(|e| anyhow!(e))?;

    let mut builder = OrchestratorBuilder::new().with_config(config);
    if let Ok(token) = std::env::var("READALONG_TOKEN") {
        builder = builder.with_credential(Arc::new(StaticCredential::new(token)));
    }

    let (orchestrator, handle) = builder.build()?;
    let workers = orchestrator.start()?;

    let events = handle.event_receiver();
    let printer = thread::spawn(move || {
        for event in events.iter() {
            print_event(&event);
            if event == OrchestratorEvent::Shutdown {
                break;
            }
        }
    });

    println!("{}", HELP);
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim() == "status" {
            println!("{}", serde_json::to_string_pretty(&handle.surface())?);
            continue;
        }
        match parse_command(&line) {
            Ok(Some(command)) => {
                let quit = command == OrchestratorCommand::Shutdown;
                handle.send_command(command)?;
                if quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}", e);
                println!("{}", HELP);
            }
        }
    }

    // End of input also shuts down
    let _ = handle.send_command(OrchestratorCommand::Shutdown);
    for worker in workers {
        let _ = worker.join();
    }
    let _ = printer.join();

    info!("Goodbye");
    Ok(())
}
