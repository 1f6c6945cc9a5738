//! Integration tests for the POSIX process backend: spawning real
//! children, redirecting their streams, and exercising the lifecycle.

#![cfg(unix)]

use rigel_core::{
    run, spawn, wait_many, CommandBuf, CoreError, EnvironmentBuf, Pipe, Redirect, SpawnOptions,
    TimedWait, EXIT_ABNORMAL,
};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

fn command(args: &[&str]) -> CommandBuf {
    let mut cmd = CommandBuf::with_capacity(256, args.len());
    cmd.append(args);
    cmd
}

/// Run a command with stdout captured into a pipe and return
/// (exit code, captured bytes).
fn run_captured(args: &[&str], opts_env: Option<&EnvironmentBuf>) -> (i32, Vec<u8>) {
    let Pipe { mut reader, writer } = Pipe::open().expect("Failed to create pipe");

    let opts = SpawnOptions {
        env: opts_env,
        redirect: Redirect {
            stdout: Some(&writer),
            ..Default::default()
        },
        ..Default::default()
    };
    let child = spawn(&command(args), &opts).expect("Failed to spawn");

    // the child holds its own copy of the write end; ours must go before
    // the read loop or EOF never arrives
    writer.close();

    let mut out = Vec::new();
    reader.read_to_end(&mut out).expect("Failed to read output");
    let code = child.wait().expect("Failed to wait");
    (code, out)
}

#[test]
fn test_exit_code_propagates() {
    let code = run(&command(&["sh", "-c", "exit 42"]), &SpawnOptions::default()).unwrap();
    assert_eq!(code, 42);
}

#[test]
fn test_nonexistent_executable_yields_no_handle() {
    let result = spawn(
        &command(&["rigel_no_such_binary_5150"]),
        &SpawnOptions::default(),
    );
    match result.unwrap_err() {
        CoreError::Spawn(_) => {}
        e => panic!("Expected Spawn error, got: {}", e),
    }
}

#[test]
fn test_captured_stdout() {
    let (code, out) = run_captured(&["echo", "hi"], None);
    assert_eq!(code, 0);
    assert_eq!(out, b"hi\n");
}

#[test]
fn test_stdin_and_stdout_redirection() {
    let Pipe {
        reader: in_reader,
        writer: mut in_writer,
    } = Pipe::open().unwrap();
    let Pipe {
        reader: mut out_reader,
        writer: out_writer,
    } = Pipe::open().unwrap();

    let opts = SpawnOptions {
        redirect: Redirect {
            stdin: Some(&in_reader),
            stdout: Some(&out_writer),
            ..Default::default()
        },
        ..Default::default()
    };
    let child = spawn(&command(&["cat"]), &opts).unwrap();

    // parent copies of the child-facing ends must not linger
    in_reader.close();
    out_writer.close();

    in_writer.write_all(b"through the pipe").unwrap();
    in_writer.close();

    let mut out = Vec::new();
    out_reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"through the pipe");
    assert_eq!(child.wait().unwrap(), 0);
}

#[test]
fn test_child_sees_stdin_eof_once_parent_closes_writer() {
    let Pipe { reader, writer } = Pipe::open().unwrap();

    let opts = SpawnOptions {
        redirect: Redirect {
            stdin: Some(&reader),
            ..Default::default()
        },
        ..Default::default()
    };
    let child = spawn(&command(&["cat"]), &opts).unwrap();

    // once both parent-side endpoints are gone, the child's stdin copy is
    // the last reference to the pipe and must deliver EOF
    reader.close();
    writer.close();

    match child.wait_timed(Some(Duration::from_secs(5))).unwrap() {
        TimedWait::Completed(code) => assert_eq!(code, 0),
        TimedWait::TimedOut(child) => {
            child.kill().unwrap();
            panic!("child never saw stdin EOF");
        }
    }
}

#[test]
fn test_timed_wait_returns_handle_then_completes() {
    let child = spawn(&command(&["sleep", "30"]), &SpawnOptions::default()).unwrap();

    let start = Instant::now();
    let child = match child.wait_timed(Some(Duration::from_millis(100))).unwrap() {
        TimedWait::TimedOut(child) => child,
        TimedWait::Completed(code) => panic!("sleep finished early with {}", code),
    };
    assert!(start.elapsed() < Duration::from_secs(5));

    // the returned handle is still live and can be escalated
    child.kill().unwrap();
}

#[test]
fn test_timed_wait_completes_within_timeout() {
    let child = spawn(&command(&["sh", "-c", "exit 7"]), &SpawnOptions::default()).unwrap();
    match child.wait_timed(Some(Duration::from_secs(30))).unwrap() {
        TimedWait::Completed(code) => assert_eq!(code, 7),
        TimedWait::TimedOut(_) => panic!("short command timed out"),
    }
}

#[test]
fn test_untimed_wait_blocks_to_completion() {
    let child = spawn(&command(&["true"]), &SpawnOptions::default()).unwrap();
    match child.wait_timed(None).unwrap() {
        TimedWait::Completed(code) => assert_eq!(code, 0),
        TimedWait::TimedOut(_) => panic!("infinite wait must not time out"),
    }
}

#[test]
fn test_kill_running_child() {
    let child = spawn(&command(&["sleep", "30"]), &SpawnOptions::default()).unwrap();
    let start = Instant::now();
    child.kill().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_kill_already_exited_child_succeeds() {
    let child = spawn(&command(&["true"]), &SpawnOptions::default()).unwrap();
    // give the child time to exit before the kill arrives
    std::thread::sleep(Duration::from_millis(200));
    child.kill().unwrap();
}

#[test]
fn test_environment_override_merges() {
    let mut env = EnvironmentBuf::with_capacity(64, 2);
    env.add("RIGEL_TEST_VAR", "override-value").unwrap();

    // the override is visible...
    let (code, out) = run_captured(
        &["sh", "-c", "printf %s \"$RIGEL_TEST_VAR\""],
        Some(&env),
    );
    assert_eq!(code, 0);
    assert_eq!(out, b"override-value");

    // ...and inherited variables survive alongside it
    let (code, out) = run_captured(&["sh", "-c", "printf %s \"$PATH\""], Some(&env));
    assert_eq!(code, 0);
    assert!(!out.is_empty());
}

#[test]
fn test_working_directory_override() {
    let dir = tempfile::tempdir().unwrap();
    let expected = std::fs::canonicalize(dir.path()).unwrap();

    let Pipe { mut reader, writer } = Pipe::open().unwrap();
    let opts = SpawnOptions {
        cwd: Some(dir.path()),
        redirect: Redirect {
            stdout: Some(&writer),
            ..Default::default()
        },
        ..Default::default()
    };
    let child = spawn(&command(&["pwd", "-P"]), &opts).unwrap();
    writer.close();

    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(child.wait().unwrap(), 0);
    assert_eq!(out.trim_end(), expected.to_str().unwrap());
}

#[test]
fn test_signalled_child_maps_to_abnormal_exit() {
    let child = spawn(
        &command(&["sh", "-c", "kill -TERM $$"]),
        &SpawnOptions::default(),
    )
    .unwrap();
    assert_eq!(child.wait().unwrap(), EXIT_ABNORMAL);
}

#[test]
fn test_wait_many_preserves_order() {
    let children = vec![
        spawn(&command(&["sh", "-c", "exit 3"]), &SpawnOptions::default()).unwrap(),
        spawn(&command(&["sh", "-c", "exit 1"]), &SpawnOptions::default()).unwrap(),
        spawn(&command(&["sh", "-c", "exit 2"]), &SpawnOptions::default()).unwrap(),
    ];
    assert_eq!(wait_many(children), vec![3, 1, 2]);
}

#[test]
fn test_discard_releases_without_waiting() {
    let child = spawn(&command(&["sleep", "30"]), &SpawnOptions::default()).unwrap();
    let start = Instant::now();
    child.discard();
    assert!(start.elapsed() < Duration::from_secs(1));
}
