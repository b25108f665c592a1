use super::command::{CommandError, CommandRunner, ProcessRunner};
use std::time::{Duration, Instant};

fn shell(script: &str) -> Vec<String> {
    vec!["-c".into(), script.into()]
}

#[test]
pub fn captures_output_and_exit_code() {
    let output = ProcessRunner
        .run(
            "sh",
            &shell("echo Submitted batch job 42; echo warning >&2; exit 3"),
            Duration::from_secs(5),
        )
        .unwrap();

    assert_eq!(output.code, Some(3));
    assert!(!output.is_success());
    assert_eq!(output.stdout, "Submitted batch job 42\n");
    assert_eq!(output.stderr, "warning\n");
}

#[test]
pub fn hanging_commands_are_killed() {
    let start = Instant::now();

    match ProcessRunner.run("sh", &shell("sleep 5"), Duration::from_millis(100)) {
        Err(CommandError::Timeout { program, .. }) => assert_eq!(program, "sh"),
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
pub fn background_children_do_not_hold_up_the_caller() {
    let start = Instant::now();

    // the backgrounded sleep inherits stdout and stderr and keeps both open
    let output = ProcessRunner
        .run(
            "sh",
            &shell("echo 12345; sleep 5 &"),
            Duration::from_millis(500),
        )
        .unwrap();

    assert!(output.is_success());
    assert_eq!(output.stdout, "12345\n");
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
pub fn missing_programs_fail_to_spawn() {
    assert!(matches!(
        ProcessRunner.run("slurmexec-no-such-program", &[], Duration::from_secs(1)),
        Err(CommandError::Spawn { .. })
    ));
}
