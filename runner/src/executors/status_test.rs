use super::status::{FailureReason, JobStatus, QueryOutcome, StatusMechanism};
use crate::job::ExternalId;

#[test]
pub fn classification_is_total() {
    for reason in FailureReason::ALL {
        assert_eq!(
            JobStatus::classify(reason.as_str()),
            JobStatus::Failed(reason)
        );
    }

    assert_eq!(JobStatus::classify("COMPLETED"), JobStatus::Completed);

    for status in ["PENDING", "RUNNING", "COMPLETING", "SUSPENDED", "completed", ""] {
        assert_eq!(
            JobStatus::classify(status),
            JobStatus::Active(status.to_owned())
        );
    }
}

#[test]
pub fn accounting_skips_job_steps() {
    let id = ExternalId::new("12345");
    let output = "12345.batch|COMPLETED|0:0\n12345|OUT_OF_MEMORY|0:125\n";

    assert_eq!(
        StatusMechanism::Accounting.parse(output, &id),
        QueryOutcome::Success(JobStatus::Failed(FailureReason::OutOfMemory))
    );
}

#[test]
pub fn accounting_strips_annotations() {
    let id = ExternalId::new("77");

    assert_eq!(
        StatusMechanism::Accounting.parse("77|CANCELLED by 1000|0:15", &id),
        QueryOutcome::Success(JobStatus::Failed(FailureReason::Cancelled))
    );
}

#[test]
pub fn accounting_without_matching_line_is_unavailable() {
    let id = ExternalId::new("12345");

    assert_eq!(
        StatusMechanism::Accounting.parse("", &id),
        QueryOutcome::Unavailable
    );
    assert_eq!(
        StatusMechanism::Accounting.parse("999|RUNNING|0:0", &id),
        QueryOutcome::Unavailable
    );
}

#[test]
pub fn control_reads_job_state() {
    let id = ExternalId::new("12345");
    let output =
        "JobId=12345 JobName=slurmjob.a.1.sh UserId=me(1000) JobState=PENDING Reason=Priority";

    assert_eq!(
        StatusMechanism::Control.parse(output, &id),
        QueryOutcome::Success(JobStatus::Active("PENDING".into()))
    );
    assert_eq!(
        StatusMechanism::Control.parse("slurm_load_jobs error", &id),
        QueryOutcome::Unavailable
    );
}
