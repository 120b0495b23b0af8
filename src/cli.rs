//! Command line interfaces for the relay binaries.
//!
//! Both definitions are shared with `build.rs`, which renders man pages from
//! them, so this module must only depend on `clap` and `std`.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Default directory receiving telemetry and imagery artifacts.
pub const DEFAULT_OUTPUT_DIR: &str = "/opt/firedrone/data";
/// Default listen address of the ground station server.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:16551";
/// Default relay server address used by the forwarder.
pub const DEFAULT_DESTINATION: &str = "127.0.0.1:16551";
/// Default alert bus the forwarder subscribes to.
pub const DEFAULT_ALERT_BUS: &str = "tcp://127.0.0.1:5556";

/// Command line arguments for `firerelay-server`.
#[derive(Debug, Parser)]
#[command(
    name = "firerelay-server",
    version,
    about = "Ground station receiver storing relayed fire detections"
)]
pub struct ServerCli {
    /// Directory receiving `telemetry/` and `imagery/` artifacts.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Address to listen on.
    #[arg(default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Maximum number of concurrently served connections.
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,

    /// Seconds a peer may stall mid-exchange before its session is closed.
    #[arg(long, default_value_t = 30)]
    pub io_timeout_secs: u64,

    /// Expose Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

/// Command line arguments for `firerelay-forwarder`.
#[derive(Debug, Parser)]
#[command(
    name = "firerelay-forwarder",
    version,
    about = "Edge forwarder relaying fire detections to the ground station"
)]
pub struct ForwarderCli {
    /// Relay server address (`host:port`).
    #[arg(short, long, default_value = DEFAULT_DESTINATION)]
    pub dst: String,

    /// ZeroMQ endpoint (`tcp://host:port`) publishing classifier alerts.
    #[arg(short, long = "zmq", value_name = "URL", default_value = DEFAULT_ALERT_BUS)]
    pub zmq: String,

    /// Number of detections buffered while the server is unreachable.
    #[arg(long, default_value_t = 256)]
    pub queue_capacity: usize,

    /// Only retry failed connection attempts; stop when a live connection
    /// drops instead of reconnecting.
    #[arg(long)]
    pub connect_only_retry: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{ForwarderCli, ServerCli};

    #[test]
    fn server_defaults_match_ground_station_layout() {
        let cli = ServerCli::parse_from(["firerelay-server"]);
        assert_eq!(cli.output.to_str(), Some("/opt/firedrone/data"));
        assert_eq!(cli.listen.to_string(), "0.0.0.0:16551");
        assert_eq!(cli.max_connections, 1024);
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn server_parses_output_and_listen_address() {
        let cli = ServerCli::parse_from(["firerelay-server", "-o", "/tmp/out", "127.0.0.1:9000"]);
        assert_eq!(cli.output.to_str(), Some("/tmp/out"));
        assert_eq!(cli.listen.port(), 9000);
    }

    #[test]
    fn forwarder_parses_short_flags() {
        let cli = ForwarderCli::parse_from([
            "firerelay-forwarder",
            "-d",
            "10.0.0.2:16551",
            "-z",
            "tcp://127.0.0.1:7000",
        ]);
        assert_eq!(cli.dst, "10.0.0.2:16551");
        assert_eq!(cli.zmq, "tcp://127.0.0.1:7000");
        assert!(!cli.connect_only_retry);
    }

    #[test]
    fn forwarder_accepts_long_bus_flag() {
        let cli = ForwarderCli::parse_from(["firerelay-forwarder", "--zmq", "tcp://bus:1"]);
        assert_eq!(cli.zmq, "tcp://bus:1");
        assert_eq!(cli.dst, "127.0.0.1:16551");
    }

    #[test]
    fn rejects_malformed_listen_address() {
        assert!(ServerCli::try_parse_from(["firerelay-server", "not-an-address"]).is_err());
    }
}
