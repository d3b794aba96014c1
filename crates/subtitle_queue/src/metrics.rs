use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec, IntCounterVec, IntGauge};

lazy_static! {
	pub static ref SUBMISSIONS: IntCounterVec =
		register_int_counter_vec!("subtitle_submissions_total", "Work submissions by outcome", &["kind", "outcome"]).expect("Failed to register SUBMISSIONS");
	pub static ref JOBS_FINISHED: IntCounterVec =
		register_int_counter_vec!("subtitle_jobs_finished_total", "Jobs finalized by status and error kind", &["status", "error_kind"]).expect("Failed to register JOBS_FINISHED");
	pub static ref JOB_DURATION: HistogramVec = register_histogram_vec!(
		"subtitle_job_duration_seconds",
		"Wall time from start to finalize",
		&["kind", "status"],
		vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
	)
	.expect("Failed to register JOB_DURATION");
	pub static ref ADMISSIONS: IntCounterVec =
		register_int_counter_vec!("subtitle_admissions_total", "Rate limiter decisions", &["decision"]).expect("Failed to register ADMISSIONS");
	pub static ref CATALOG_REFRESHES: IntCounterVec =
		register_int_counter_vec!("subtitle_catalog_refreshes_total", "Catalog refresh attempts by result", &["result"]).expect("Failed to register CATALOG_REFRESHES");
	pub static ref ACTIVE_JOBS: IntGauge = register_int_gauge!("subtitle_active_jobs", "Jobs currently executing in this process").expect("Failed to register ACTIVE_JOBS");
}
