//! # Cardinality & Volume Governor
//!
//! Keeps unbounded consumer populations from blowing up metric
//! cardinality (C2), and classifies consumers into rolling volume
//! buckets for telemetry tagging (C3). See spec §4.2/§4.3.

pub mod cardinality;
pub mod volume;

pub use cardinality::{CardinalityGovernor, CardinalityStats, DEFAULT_BUCKET_COUNT, djb2};
pub use volume::{VolumeBucket, VolumeClassifier, VolumeStats};
