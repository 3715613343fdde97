use test_util::*;

#[test]
fn end_of_input_exits_zero() {
    let r = run_stdin("echo one\ngrep x /definitely/missing\n", &[]);
    assert_eq!(r.code, 0);
    assert_eq!(r.stdout, "one\n");
    assert_eq!(r.stderr, "grep: /definitely/missing: No such file or directory\n");
}

#[test]
fn exit_code_is_the_shell_status() {
    assert_eq!(run_script("exit 42", &[], "").code, 42);
    assert_eq!(run_script("exit", &[], "").code, 0);
    let r = run_script("exit nope\necho after", &[], "");
    assert_eq!((r.code, r.stdout.as_str()), (0, "after\n"));
    assert_eq!(r.stderr, "exit: expected numeric exit code\n");
}

#[test]
fn variables_and_arithmetic() {
    let r = run_script("N=5\nNAME=world\necho \"hello $NAME\" $((N * (N + 1) / 2)) '$NAME' \\$NAME", &[], "");
    assert_eq!(r.stdout, "hello world 15 $NAME $NAME\n");
}

#[test]
fn deeply_nested_arithmetic_is_zero_and_the_shell_goes_on() {
    let depth = 200_000;
    let line = format!("echo $(({}1{}))\necho after\n", "(".repeat(depth), ")".repeat(depth));
    let r = run_stdin(&line, &[]);
    assert_eq!((r.code, r.stdout.as_str(), r.stderr.as_str()), (0, "0\nafter\n", ""));
}

#[test]
fn syntax_errors_continue_with_status_2() {
    let r = run_script("echo \"open\necho $?\n| wc\necho done", &[], "");
    assert_eq!(r.stdout, "2\ndone\n");
    assert_eq!(r.stderr, "pipesh: parse error: unterminated \" quote\npipesh: parse error: missing command before '|'\n");
}

#[test]
fn no_prompt_when_stdin_is_not_a_terminal() {
    let r = run_stdin("echo a\n", &[]);
    assert_eq!(r.stdout, "a\n");
}

#[test]
fn builtins_read_files() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("notes.txt");
    std::fs::write(&p, "apple\nBanana\ncherry\n").unwrap();
    let path = p.to_string_lossy();
    let r = run_script(&format!("cat {path} | grep -i banana\nwc {path}\ngrep -A 1 apple {path}"), &[], "");
    assert_eq!(r.stdout, "Banana\n3 3 20\napple\nBanana\n");
}

#[test]
fn invalid_pipeline_model_is_rejected() {
    let r = run_script("echo hi", &["--pipeline-model", "coroutines"], "");
    assert_eq!(r.code, 2);
    assert!(r.stderr.contains("coroutines"));
}

#[cfg(unix)]
#[test]
fn missing_program_alone_is_127_and_shell_goes_on() {
    let r = run_script("pipesh-no-such-program arg\necho status $?", &[], "");
    assert_eq!(r.code, 0);
    assert_eq!(r.stdout, "status 127\n");
    assert_eq!(r.stderr, "pipesh: pipesh-no-such-program: command not found\n");
}

#[cfg(unix)]
#[test]
fn single_external_inherits_the_shell_streams() {
    let r = run_script("sh -c 'cat; echo err >&2'", &[], "from stdin\n");
    assert_eq!(r.stdout, "from stdin\n");
    assert_eq!(r.stderr, "err\n");
}

#[cfg(unix)]
#[test]
fn base_environment_reaches_children() {
    let r = run_script("PIPESH_V=1\nsh -c 'echo $PIPESH_V'\nPIPESH_V=2 sh -c 'echo $PIPESH_V'\nsh -c 'echo $PIPESH_V'", &[], "");
    assert_eq!(r.stdout, "1\n2\n1\n");
}
