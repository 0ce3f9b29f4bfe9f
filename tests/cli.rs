use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn temp_workspace() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn rtok() -> Command {
    Command::cargo_bin("rtok").expect("binary exists")
}

#[test]
fn tokenize_and_detokenize_stdin() {
    let tokenized = rtok()
        .args(["--quiet", "tokenize", "--mode", "aggressive", "--joiner-annotate"])
        .write_stdin("Hello, world!\nso-called\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let tokenized = String::from_utf8(tokenized).expect("utf-8 output");
    assert_eq!(tokenized, "Hello ￭, world ￭!\nso ￭-￭ called\n");

    let restored = rtok()
        .args(["--quiet", "detokenize", "--joiner-annotate"])
        .write_stdin(tokenized)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(restored).expect("utf-8 output"),
        "Hello, world!\nso-called\n"
    );
}

#[test]
fn tokenize_files_with_options_file() {
    let workspace = temp_workspace();
    let options = workspace.path().join("options.json");
    let input = workspace.path().join("input.txt");
    let output = workspace.path().join("output.txt");
    fs::write(&options, r#"{"mode": "space", "case_feature": true}"#).expect("write options");
    fs::write(&input, "Hello WORLD\n").expect("write input");

    rtok()
        .current_dir(workspace.path())
        .args(["--quiet", "tokenize", "--options", "options.json", "-i", "input.txt"])
        .args(["-o", "output.txt", "--delimiter", "|"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(&output).expect("read output"),
        "hello￨C|world￨U\n"
    );
}

#[test]
fn learn_bpe_then_tokenize_with_it() {
    let workspace = temp_workspace();
    let corpus = workspace.path().join("corpus.txt");
    let codes = workspace.path().join("codes.bpe");
    fs::write(&corpus, "low low low lower newest newest\n").expect("write corpus");

    rtok()
        .current_dir(workspace.path())
        .args(["--quiet", "learn-bpe", "corpus.txt", "-s", "2", "-o", "codes.bpe"])
        .args(["--description", "toy"])
        .assert()
        .success();
    let merges = fs::read_to_string(&codes).expect("read codes");
    assert_eq!(merges, "#version: 0.2\n# toy\nl o\nlo w</w>\n");

    let tokenized = rtok()
        .current_dir(workspace.path())
        .args(["--quiet", "tokenize", "--mode", "space", "--joiner-annotate"])
        .args(["--bpe-model", "codes.bpe"])
        .write_stdin("low lower\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(tokenized).expect("utf-8 output"),
        "low lo￭ w￭ e￭ r\n"
    );
}

#[test]
fn learn_bpe_writes_to_stdout() {
    let workspace = temp_workspace();
    let corpus = workspace.path().join("dict.txt");
    fs::write(&corpus, "ab 5\ncd 1\n").expect("write dict");

    let output = rtok()
        .args(["--quiet", "learn-bpe", "--dict-input", "-s", "10"])
        .arg(&corpus)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(output).expect("utf-8 output"),
        "#version: 0.2\na b</w>\n"
    );
}

#[test]
fn build_vocab_counts_tokens() {
    let workspace = temp_workspace();
    let corpus_dir = workspace.path().join("corpus");
    fs::create_dir(&corpus_dir).expect("create corpus dir");
    fs::write(corpus_dir.join("a.txt"), "b a b\n").expect("write a");
    fs::write(corpus_dir.join("b.txt"), "c b\n").expect("write b");
    let vocab = workspace.path().join("vocab.txt");

    rtok()
        .args(["--quiet", "build-vocab", "--special-token", "<unk>", "--size", "3"])
        .arg(&corpus_dir)
        .arg("-o")
        .arg(&vocab)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(&vocab).expect("read vocab"),
        "<unk>\nb\na\n"
    );
}

#[test]
fn missing_model_is_reported() {
    let workspace = temp_workspace();
    let assert = rtok()
        .current_dir(workspace.path())
        .args(["--quiet", "tokenize", "--bpe-model", "missing.bpe"])
        .write_stdin("hello\n")
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("missing.bpe"), "stderr: {stderr}");
}

#[test]
fn invalid_mode_is_rejected() {
    rtok()
        .args(["tokenize", "--mode", "fancy"])
        .write_stdin("hello\n")
        .assert()
        .failure();
}
