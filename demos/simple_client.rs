//! Simple IRC client example
//!
//! Connects to a server, lets the engine handle registration and
//! keepalive, joins a channel once the welcome numeric arrives, and
//! prints the raw traffic.

use std::sync::Arc;

use anyhow::Result;

use slirc_client::{ClientConfig, EngineEvent, NullUserPool, ServerAddr, Session};

#[tokio::main]
async fn main() -> Result<()> {
    let addr: ServerAddr = "irc.libera.chat:6667".parse()?;
    let mut config = ClientConfig::new(addr, "slirc_example");
    config.realname = "slirc-client example".to_string();

    let (mut session, mut events) = Session::new(config, Arc::new(NullUserPool));

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::RawReceived(line) => println!("← {line}"),
                EngineEvent::RawSent(line) => println!("→ {line}"),
                other => println!("-- {other:?}"),
            }
        }
    });

    // 001 (RPL_WELCOME) means registration completed; join and greet.
    session.registry_mut().set_handler(
        "001",
        Box::new(|ctx, _frame| {
            if let Ok(chan) = ctx.channels.join("#example") {
                let _ = chan.send_message("Hello from slirc-client!");
            }
        }),
    );

    session.connect().await?;
    session.run().await;
    session.disconnect(Some("Goodbye!")).await;

    Ok(())
}
