use std::env;

use tracing::info;

use vcm_sim::{Config, Result, Simulator};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let mut config = Config::default();

    // Optional positional overrides: bind ip, bind port
    let args: Vec<String> = env::args().collect();
    if let Some(ip) = args.get(1) {
        let port = match args.get(2) {
            Some(port) => port
                .parse()
                .map_err(|e| vcm_sim::Error::config(format!("invalid port: {}", e)))?,
            None => config.bind_addr.port(),
        };
        config.bind_addr = format!("{}:{}", ip, port)
            .parse()
            .map_err(|e| vcm_sim::Error::config(format!("invalid bind address: {}", e)))?;
    }

    info!("VCM simulator v{} starting", vcm_sim::VERSION);

    let simulator = Simulator::new(config).await?;
    simulator.run().await
}
