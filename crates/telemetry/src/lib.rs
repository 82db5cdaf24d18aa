//! Request telemetry for the consumer token sidecar: the counters named
//! in spec §4.8/§4.9, served as a JSON snapshot rather than pushed to an
//! exporter (OTLP/Prometheus wiring is out of scope, spec §1).

pub mod engine;

pub use engine::{
    AuthAttemptCounts, AuthResult, TelemetryEngine, TelemetrySnapshot, VolumeAverages,
    VolumeCounts,
};
