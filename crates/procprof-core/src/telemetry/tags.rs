/// Tracing target for profiler lifecycle events.
pub const TARGET_PROFILER: &str = "procprof.profiler";
/// Tracing target for scheduler events.
pub const TARGET_SCHEDULER: &str = "procprof.scheduler";
/// Tracing target for measurements written by the logging sink.
pub const TARGET_SINK: &str = "procprof.sink";

/// Container/allocation identifier consulted when building identity tags.
pub const ENV_CONTAINER_ID: &str = "CONTAINER_ID";

pub const TAG_CONTAINER_ID: &str = "container_id";
pub const TAG_APPLICATION_ID: &str = "application_id";

pub const TAG_TASK_FAMILY: &str = "task_family";
pub const TAG_TASK_DATE: &str = "task_date";
pub const TAG_TASK_HOUR: &str = "task_hour";
pub const TAG_APPLICATION_NAME: &str = "application_name";
pub const TAG_EXECUTOR_COUNT: &str = "executor_count";
pub const TAG_EXECUTOR_CORES: &str = "executor_cores";

/// Job/run metadata keys, in the order their tags are appended.
pub const METADATA_TAG_KEYS: [&str; 6] = [
    TAG_TASK_FAMILY,
    TAG_TASK_DATE,
    TAG_TASK_HOUR,
    TAG_APPLICATION_NAME,
    TAG_EXECUTOR_COUNT,
    TAG_EXECUTOR_CORES,
];

pub const METRIC_MEMORY_RSS_BYTES: &str = "memory.rss_bytes";
pub const METRIC_MEMORY_VIRTUAL_BYTES: &str = "memory.virtual_bytes";
pub const METRIC_MEMORY_RSS_MAX_BYTES: &str = "memory.rss_bytes.max";
pub const METRIC_MEMORY_RSS_MIN_BYTES: &str = "memory.rss_bytes.min";
