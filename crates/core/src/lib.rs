mod apply;
mod composite;
mod config;
mod counter;
mod exif_reader;
mod geocode;
mod metadata;
mod naming;
mod planner;
mod sanitize;

pub use apply::{
    apply_plan, undo_last, undo_last_from, ApplyOptions, ApplyOutcome, ApplyReport, ApplyStatus,
    UndoResult,
};
pub use composite::{
    CommandCompositor, CompositeError, CompositeRequest, Compositor, MapOptions,
    MapOverlayCompositor, MapSize, MapZoom, UnknownOption,
};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use counter::{CounterLedger, CounterOverflow, LedgerSummary};
pub use geocode::{
    build_client, GeoLabel, GeocodeProvider, GeocodeSettings, GeocodingResolver, ProviderError,
    RawPlace,
};
pub use metadata::{
    extract_record, Coordinates, ExifExtractor, Extraction, MediaKind, MetadataExtractor,
    PhotoRecord, PHOTO_EXTENSIONS, VIDEO_EXTENSIONS,
};
pub use naming::{
    format_timestamp, validate_separator, Location, NamePattern, ProcessedName, SeparatorError,
    DEFAULT_SEPARATOR, MAP_TAG, MAX_COUNTER,
};
pub use planner::{
    generate_plan, generate_plan_with, PlanAction, PlanEntry, PlanError, PlanOptions, RenamePlan,
    RenameStats, SkipReason, VideoFile,
};
