// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::{Duration, Instant};

use scriptloop::error::ScriptError;
use scriptloop::script::{Interpreter, Value};
use scriptloop::{EventLoop, LoopConfig, LoopError};
use scriptloop_buffer::Buffer;
use scriptloop_tests::recorder::wait_until;

fn run_script(source: &str, config: LoopConfig) -> (Result<(), LoopError>, EventLoop<Interpreter>) {
    let program = Interpreter::compile("main.json", source).unwrap();
    let event_loop = EventLoop::with_config(Interpreter::new(), config);
    let result = event_loop.run(|vm| vm.run(&program).map_err(Into::into));
    (result, event_loop)
}

fn output(event_loop: &EventLoop<Interpreter>) -> Vec<String> {
    event_loop
        .with_context(|vm| vm.output().to_vec())
        .unwrap()
}

#[cfg(feature = "long-running")]
const TICK_MS: u64 = 1000;
#[cfg(not(feature = "long-running"))]
const TICK_MS: u64 = 100;

#[test]
fn test_run() {
    let script = format!(
        r#"[
            {{"op": "set-timeout", "delay_ms": {TICK_MS}, "body": [{{"op": "log", "message": "ok"}}]}},
            {{"op": "log", "message": "Started"}}
        ]"#
    );
    let started = Instant::now();
    let (result, event_loop) = run_script(&script, LoopConfig::default());
    result.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(TICK_MS));
    assert_eq!(output(&event_loop), vec!["Started", "ok"]);
}

#[test]
fn test_start() {
    let script = format!(
        r#"[
            {{"op": "set-timeout", "delay_ms": {TICK_MS}, "body": [{{"op": "log", "message": "ok"}}]}},
            {{"op": "log", "message": "Started"}}
        ]"#
    );
    let program = Interpreter::compile("main.json", &script).unwrap();
    let event_loop = EventLoop::new(Interpreter::new());
    event_loop.start().unwrap();
    event_loop.run_on_loop(move |vm| vm.run(&program).map_err(Into::into));

    std::thread::sleep(Duration::from_millis(2 * TICK_MS));
    event_loop.stop().unwrap();
    assert_eq!(output(&event_loop), vec!["Started", "ok"]);
    assert!(event_loop.errors().try_recv().is_err());
}

#[test]
fn test_interval() {
    let script = format!(
        r#"[
            {{"op": "set", "name": "count", "value": 0}},
            {{"op": "set-interval", "period_ms": {TICK_MS}, "name": "t", "body": [
                {{"op": "log", "message": "tick"}},
                {{"op": "incr", "name": "count"}},
                {{"op": "if-above", "name": "count", "value": 2, "then": [
                    {{"op": "clear-interval", "name": "t"}}
                ]}}
            ]}},
            {{"op": "log", "message": "Started"}}
        ]"#
    );
    let (result, event_loop) = run_script(&script, LoopConfig::default());
    result.unwrap();
    assert_eq!(output(&event_loop), vec!["Started", "tick", "tick", "tick"]);
    assert_eq!(
        event_loop.with_context(|vm| vm.get("count").cloned()).unwrap(),
        Some(Value::Int(3))
    );
}

#[test]
fn test_run_no_schedule() {
    let (result, event_loop) = run_script("[]", LoopConfig::default());
    result.unwrap();
    assert!(output(&event_loop).is_empty());
    assert_eq!(event_loop.job_count(), 0);
}

#[test]
fn test_run_with_console() {
    let script = r#"[{"op": "log", "message": "Started"}]"#;
    let (result, _) = run_script(script, LoopConfig::default());
    result.unwrap();
    let (result, _) = run_script(script, LoopConfig::default().with_console(true));
    result.unwrap();
}

#[test]
fn test_run_no_console() {
    let script = r#"[{"op": "log", "message": "Started"}]"#;
    let (result, event_loop) = run_script(script, LoopConfig::default().with_console(false));
    match result {
        Err(LoopError::Callback { error, .. }) => {
            assert_eq!(
                error.downcast_ref::<ScriptError>(),
                Some(&ScriptError::NotDefined("console".into()))
            );
        }
        other => panic!("expected a console error, got {other:?}"),
    }
    assert!(output(&event_loop).is_empty());
}

#[test]
fn test_clear_interval_race() {
    let script = format!(
        r#"[
            {{"op": "set-interval", "period_ms": {}, "name": "t", "body": [{{"op": "log", "message": "tick"}}]}},
            {{"op": "sleep", "ms": {}}},
            {{"op": "clear-interval", "name": "t"}}
        ]"#,
        TICK_MS / 2,
        TICK_MS * 2
    );
    // must not hang
    let (result, event_loop) = run_script(&script, LoopConfig::default());
    result.unwrap();
    assert!(output(&event_loop).is_empty());
}

#[test]
fn test_timeout_cleared_by_script() {
    let script = r#"[
        {"op": "set-timeout", "delay_ms": 100, "name": "late", "body": [{"op": "log", "message": "fired"}]},
        {"op": "set-timeout", "delay_ms": 10, "body": [{"op": "clear-timeout", "name": "late"}]},
        {"op": "clear-timeout", "name": "missing_is_an_error"}
    ]"#;
    let (result, event_loop) = run_script(script, LoopConfig::default());
    // the reference error only ends the initial program
    assert!(matches!(result, Err(LoopError::Callback { .. })));
    assert!(output(&event_loop).is_empty());
    assert_eq!(event_loop.job_count(), 0);
}

#[test]
fn test_script_error_in_timer_keeps_loop_going() {
    let script = r#"[
        {"op": "set-timeout", "delay_ms": 10, "body": [{"op": "throw", "message": "boom"}]},
        {"op": "set-timeout", "delay_ms": 20, "body": [{"op": "log", "message": "after"}]}
    ]"#;
    let (result, event_loop) = run_script(script, LoopConfig::default());
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "timeout 1 failed: Uncaught boom");
    assert_eq!(output(&event_loop), vec!["after"]);
}

#[test]
fn test_oversized_timeout_delay() {
    let script = r#"[
        {"op": "set-timeout", "delay_ms": 18446744073709551615, "body": [{"op": "log", "message": "fired"}]}
    ]"#;
    let started = Instant::now();
    let (result, event_loop) = run_script(script, LoopConfig::default());
    result.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(output(&event_loop), vec!["fired"]);
    assert_eq!(event_loop.job_count(), 0);
}

#[test]
fn test_run_with_buffer() {
    let script = r#"[
        {"op": "buffer", "name": "b", "from": [1, 2, 3]},
        {"op": "log-value", "name": "b"}
    ]"#;
    for _ in 0..2 {
        let (result, event_loop) = run_script(script, LoopConfig::default());
        result.unwrap();
        assert_eq!(output(&event_loop), vec![r#"{"type":"Buffer","data":[1,2,3]}"#]);
        assert_eq!(
            event_loop.with_context(|vm| vm.get("b").cloned()).unwrap(),
            Some(Value::Buffer(Buffer::from(vec![1, 2, 3])))
        );
    }
}

#[test]
fn test_programs_scheduled_from_other_threads() {
    let event_loop = EventLoop::new(Interpreter::new());
    event_loop.start().unwrap();
    let handle = event_loop.handle();
    let program = Interpreter::compile(
        "worker.json",
        r#"[{"op": "set", "name": "n", "value": 41}, {"op": "incr", "name": "n"}]"#,
    )
    .unwrap();

    std::thread::spawn(move || handle.run_on_loop(move |vm| vm.run(&program).map_err(Into::into)))
        .join()
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || event_loop.job_count() == 0));
    let vm = event_loop.into_context().unwrap();
    assert_eq!(vm.get("n"), Some(&Value::Int(42)));
}

#[cfg(feature = "requires-cargo")]
mod cli {
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine as _;
    use scriptloop_tests::run_scriptloop::ScriptloopCommand;

    const PROGRAM: &str = r#"[
        {"op": "set-timeout", "delay_ms": 100, "body": [{"op": "log", "message": "ok"}]},
        {"op": "log", "message": "Started"}
    ]"#;

    #[test]
    fn test_cli_run() {
        let out = ScriptloopCommand::new().program_json(PROGRAM).run().unwrap();
        let stderr = String::from_utf8_lossy(&out.stderr);
        println!("stderr: {stderr}");
        assert!(out.status.success());
        let started = stderr.find("console] Started").expect("Started not logged");
        let ok = stderr.find("console] ok").expect("ok not logged");
        assert!(started < ok);
    }

    #[test]
    fn test_cli_start_base64() {
        let out = ScriptloopCommand::new()
            .program_base64(&BASE64_STANDARD.encode(PROGRAM))
            .start_for_ms(500)
            .run()
            .unwrap();
        println!("stderr: {}", String::from_utf8_lossy(&out.stderr));
        assert!(out.status.success());
    }

    #[test]
    fn test_cli_exit_codes() {
        let out = ScriptloopCommand::new().run().unwrap();
        assert_eq!(out.status.code(), Some(2));

        let out = ScriptloopCommand::new().program_json("[{").run().unwrap();
        assert_eq!(out.status.code(), Some(1));

        let out = ScriptloopCommand::new()
            .program_json(PROGRAM)
            .no_console()
            .run()
            .unwrap();
        assert_eq!(out.status.code(), Some(1));
    }
}
