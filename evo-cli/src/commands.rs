//! Subcommand handlers.

use crate::Commands;
use anyhow::Context;
use evo_core::security::RbacManager;
use evo_core::{EvoConfig, Pipeline, RequestContext, Tier};
use std::net::SocketAddr;
use std::sync::Arc;

pub async fn handle_command(command: Commands, config: EvoConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Route { input } => {
            let pipeline = Pipeline::from_config(config);
            let (decision, payload) = pipeline.route(&input).await;
            let out = serde_json::json!({
                "decision": decision,
                "payload": payload,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Ask { input, tier } => {
            let pipeline = Pipeline::from_config(config);
            let ctx = RequestContext::with_tier(Tier::parse(&tier));
            let response = pipeline
                .handle(&input, &ctx)
                .await
                .map_err(|e| anyhow::anyhow!("Request failed ({}): {}", e.status_code(), e))?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Token { user_id, role } => {
            let rbac = RbacManager::from_config(&config.security);
            let token = rbac
                .generate_token(&user_id, &role)
                .context("Failed to sign token")?;
            println!("{token}");
            Ok(())
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

async fn serve(mut config: EvoConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let pipeline = Pipeline::from_config(config);
    if !pipeline.brain().is_configured() {
        tracing::warn!("No API key found; serving with the offline generator");
    }

    evo_core::gateway::run_gateway(Arc::new(pipeline), addr)
        .await
        .context("Gateway stopped with an error")
}
