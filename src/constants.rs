//! # Engine Constants
//!
//! Stable identifiers shared between plugins, the registry and the orchestrator:
//! parameter ids, plugin categories, object field names and configuration defaults.

/// Plugin categories
pub mod categories {
    /// Plugin is only reachable as a step or internal action, never listed to callers
    pub const NOT_LISTABLE: &str = "not_listable";
    pub const MANAGEMENT: &str = "management";
    pub const DISPOSAL: &str = "disposal";
    pub const SYNCHRONIZATION: &str = "synchronization";
}

/// Plugin parameter identifiers
pub mod params {
    pub const DISPOSAL_HOLD_ID: &str = "disposal_hold_id";
    pub const DISPOSAL_HOLD_LIFT_ALL: &str = "disposal_hold_lift_all";
    pub const INSTANCE_ID: &str = "instance_id";

    pub const DO_INSTANCE_IDENTIFIER_AIP: &str = "do_instance_identifier_aip";
    pub const DO_INSTANCE_IDENTIFIER_DIP: &str = "do_instance_identifier_dip";
    pub const DO_INSTANCE_IDENTIFIER_PRESERVATION_METADATA: &str =
        "do_instance_identifier_preservation_metadata";
    pub const DO_INSTANCE_IDENTIFIER_JOB: &str = "do_instance_identifier_job";
}

/// Field names on stored objects touched by the built-in plugins
pub mod fields {
    pub const DISPOSAL_HOLDS: &str = "disposal_holds";
    pub const LIFTED_DISPOSAL_HOLDS: &str = "lifted_disposal_holds";
    pub const STATE: &str = "state";
    pub const INSTANCE_ID: &str = "instance_id";
    pub const UPDATED_BY: &str = "updated_by";
    pub const LIFTED_ON: &str = "lifted_on";
    pub const LIFTED_BY: &str = "lifted_by";
}

/// Values of a disposal hold's `state` field
pub mod hold_states {
    pub const ACTIVE: &str = "ACTIVE";
    pub const LIFTED: &str = "LIFTED";
}

/// Configuration defaults
pub mod defaults {
    pub const WORKER_COUNT: usize = 4;
    pub const LIMITED_WORKER_COUNT: usize = 1;
    pub const BATCH_SIZE: usize = 100;
    pub const INDEX_PAGE_SIZE: usize = 1000;
    pub const RETAINED_FINISHED_JOBS: usize = 100;
    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 100;
    pub const RETRY_MAX_DELAY_MS: u64 = 5000;
    pub const RETRY_MULTIPLIER: f64 = 2.0;
    pub const CONFIG_FILE: &str = "jobs.toml";
    pub const ENV_PREFIX: &str = "JOBS";
}

/// Report detail messages produced by the engine itself
pub mod details {
    pub const NO_OUTCOME_REPORTED: &str = "Plugin finished the batch without reporting an outcome for this object";
    pub const JOB_CANCELLED: &str = "Job was cancelled before this object was dispatched";
    pub const STEP_DISABLED: &str = "Step disabled by job parameters";
    pub const STEP_STOPPED: &str = "Skipped because a previous step failed and is configured to stop the job";
}
