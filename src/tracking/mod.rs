//! Component-Tracking: Label-Erzeugung, Analyse, Bearbeitung, Cache,
//! Zuordnung über die Zeit und Clustering.

pub mod analyzer;
pub mod cache;
pub mod cell;
pub mod clusterizer;
pub mod editor;
pub mod generator;
pub mod sequence;
pub mod spatial;
pub mod track_map;
pub mod volume;

pub use analyzer::{CompAnalyzer, NO_DATA};
pub use cache::{
    CacheError, CacheQueue, CacheStats, DiskVolSource, MemoryVolSource, VolCache, VolCacheSource,
    DEFAULT_QUEUE_SIZE,
};
pub use cell::{Cell, CellSummary, CelpList};
pub use clusterizer::{ClusterMethod, ClusterParams, ClusterResult, Clusterizer};
pub use editor::{CleanMode, ComponentEditor, EditOutcome};
pub use generator::CompGenerator;
pub use sequence::{FrameSummary, SequenceAnalyzer, SequenceReport};
pub use spatial::{match_cost, CentroidIndex, CentroidMatch};
pub use track_map::{TrackMap, TrackParams};
pub use volume::LabelVolume;
