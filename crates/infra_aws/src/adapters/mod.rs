pub mod cloudformation;
pub mod cluster_settings;
pub mod compute_pool;
pub mod identity;
