//! Transport supervision
//!
//! Keeps one line connection open for the lifetime of the engine: a serial
//! port or TCP socket that is reopened after a fixed back-off, or an
//! in-process simulator.

use std::collections::BTreeSet;
use std::time::Duration;

use dsp_engine::{
    ConnectionEnd, ControlConfig, DspConfig, EngineError, LineConnection, TransportLink,
};
use dsp_protocol::{DeviceId, DeviceType};
use dsp_sim::{run_virtual_dsp_task, VirtualDsp};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Wait between reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Firmware version reported by simulated units
const SIMULATED_VERSION: &str = "sim-1.0";

/// Open the configured transport and reopen it whenever it drops
///
/// Returns once the engine has gone away.
pub async fn run_reconnecting(control: ControlConfig, mut link: TransportLink) {
    loop {
        // Anything written while the link was down belongs to the old connection
        while link.outbound.try_recv().is_ok() {}

        info!("Connecting to {}", control);
        let result = connect_and_run(&control, &mut link).await;

        match result {
            Ok(ConnectionEnd::EngineGone) => {
                debug!("Engine stopped, closing {}", control);
                return;
            }
            Ok(ConnectionEnd::Closed) => warn!("Connection to {} closed by peer", control),
            Err(e) => {
                warn!("Connection to {} failed: {}", control, e);
                link.report_error(control.to_string(), e.to_string());
            }
        }

        if link.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_and_run(
    control: &ControlConfig,
    link: &mut TransportLink,
) -> Result<ConnectionEnd, EngineError> {
    match control {
        ControlConfig::Com { port, baud_rate } => {
            LineConnection::open_serial(port, *baud_rate)?.run(link).await
        }
        ControlConfig::Tcp { address, port } => {
            LineConnection::connect_tcp(address, *port)
                .await?
                .run(link)
                .await
        }
    }
}

/// Serve the engine from a simulated rack built from the configured levels
pub async fn run_simulated(config: DspConfig, mut link: TransportLink) {
    let dsp = simulated_rack(&config);
    info!("Simulating {} unit(s) for {}", dsp.units().len(), config.key);

    let (client, server) = tokio::io::duplex(1024);
    // The simulator runs until its command channel closes
    let (_sim_cmd, sim_rx) = mpsc::channel(8);
    let (sim_events, _) = broadcast::channel(64);
    let sim = tokio::spawn(run_virtual_dsp_task(server, dsp, sim_rx, sim_events));

    match LineConnection::new("simulator".to_string(), client)
        .run(&mut link)
        .await
    {
        Ok(end) => debug!("Simulator connection ended: {:?}", end),
        Err(e) => {
            warn!("Simulator connection failed: {}", e);
            link.report_error("simulator", e.to_string());
        }
    }

    sim.abort();
}

/// One simulated unit per distinct address in the configuration
fn simulated_rack(config: &DspConfig) -> VirtualDsp {
    let units: BTreeSet<(DeviceType, DeviceId)> = config
        .levels
        .values()
        .map(|level| (level.device_type, level.device_id))
        .filter(|(device_type, device_id)| {
            *device_type != DeviceType::Any && *device_id != DeviceId::ANY
        })
        .collect();

    units.into_iter().fold(
        VirtualDsp::new(config.key.clone()),
        |dsp, (device_type, device_id)| dsp.with_unit(device_type, device_id, SIMULATED_VERSION),
    )
}
