pub mod assembler;
pub mod config;
pub mod error;
pub mod feed;
pub mod geo;
pub mod grouping;
pub mod notice;
pub mod package;
pub mod progress;
pub mod records;
pub mod reference;
pub mod registry;
pub mod service;
pub mod sink;
pub mod source;
pub mod synth;

pub use assembler::{AssemblyOutcome, FeedAssembler, FeedSummary, PatternPlan};
pub use config::{
    BusTimingConfig, CalendarConfig, DistanceMode, PeakWindow, PhysicalLimits,
    RailTimingConfig, SynthesisConfig,
};
pub use error::{ConfigError, PackageError, SinkError, SourceError, SynthesisError};
pub use feed::{GtfsTable, FEED_FILE_NAMES};
pub use grouping::{group, RouteGroup, RouteGroups, RouteKey};
pub use notice::{NoticeContainer, NoticeSeverity, SynthesisNotice};
pub use package::package_feed;
pub use progress::{NoOpProgressHandler, ProgressHandler};
pub use records::{
    DayType, SequenceRecord, ServiceRecord, ServiceTimes, SourceData, StationRecord, StopRecord,
};
pub use reference::ReferenceData;
pub use registry::{RegisteredStop, StopRegistry};
pub use service::{resolve_headway, Headway, HeadwayResolution, ServiceWindow};
pub use sink::{BatchWriter, BufferedSink, CsvTableWriter, MemoryTableWriter, SinkSummary, TripSink};
pub use source::load_dir;
pub use synth::{PatternStop, SynthesisStats, TimetableSynthesizer, TravelTime, TripPattern};
