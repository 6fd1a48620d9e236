//! Runs the selector against the bundled material-count UCI engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use game_selector::report::{REPORT_FILE, SENTINEL_FILE, TOTALS_FILE};
use game_selector::partition::KEPT_FILE;
use game_selector::{
    run_selection, CancelToken, EngineSettings, Evaluator, SelectorConfig, UciEngine, SUMMARY_FILE,
};

const ENGINE: &str = env!("CARGO_BIN_EXE_material_uci");
const SELECTOR: &str = env!("CARGO_BIN_EXE_game_selector");

const GAMES: &str = r#"[Event "normal"]
[White "Alpha"]
[Black "Beta"]
[Result "1-0"]

1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0

[Event "crash, queen up"]
[White "Alpha"]
[Black "Beta"]
[Result "1-0"]
[SetUp "1"]
[FEN "4k3/8/8/8/8/8/8/3QK3 w - - 0 1"]

1. Kf2 {xengine exited unexpectedly} 1-0

[Event "time loss, queen up"]
[White "Gamma"]
[Black "Alpha"]
[Result "0-1"]
[SetUp "1"]
[FEN "4k3/8/8/8/8/8/8/3QK3 w - - 0 1"]

1. Kf2 {White forfeits on time} 0-1

[Event "mated winner"]
[White "Beta"]
[Black "Gamma"]
[Result "1-0"]

1. f3 e5 2. g4 Qh4# {Black wins on time} 1-0
"#;

fn settings() -> EngineSettings {
    let mut settings = EngineSettings::new(ENGINE, 16, 1);
    settings.response_grace = Duration::from_secs(5);
    settings
}

fn setup(dir: &Path) -> SelectorConfig {
    let input = dir.join("games.pgn");
    fs::write(&input, GAMES).unwrap();
    let mut config = SelectorConfig::new(&input, ENGINE, dir.join("out"));
    config.move_time = Duration::from_millis(10);
    config.response_grace = Duration::from_secs(5);
    config.show_progress = false;
    config
}

fn events(path: &Path) -> Vec<String> {
    game_selector::PgnReader::open(path)
        .unwrap()
        .map(|g| g.unwrap().header("Event").unwrap_or("").to_string())
        .collect()
}

#[test]
fn test_engine_session_scores_positions() {
    let mut engine = UciEngine::start(settings()).unwrap();
    let move_time = Duration::from_millis(10);

    let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    assert_eq!(engine.evaluate(start, move_time).unwrap(), 0.0);
    // Black to move, a queen down: the score is flipped to White's view.
    assert_eq!(engine.evaluate("4k3/8/8/8/8/8/8/3QK3 b - - 0 1", move_time).unwrap(), 9.0);
    // Mate in one for White saturates.
    assert_eq!(engine.evaluate("k7/8/1K6/8/8/8/8/7Q w - - 0 1", move_time).unwrap(), 320.0);

    engine.restart().unwrap();
    assert_eq!(engine.evaluate(start, move_time).unwrap(), 0.0);
    engine.shutdown().unwrap();
}

#[test]
fn test_selection_with_real_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    config.validate().unwrap();

    let mut engine = UciEngine::start(config.engine_settings()).unwrap();
    let summary = run_selection(&config, &mut engine, &CancelToken::new()).unwrap();
    engine.shutdown().unwrap();

    assert_eq!(summary.games_parsed, 4);
    assert_eq!(summary.engine_evaluations, 3);
    assert_eq!(events(&config.good), ["normal", "crash, queen up"]);
    assert_eq!(events(&config.bad), ["time loss, queen up", "mated winner"]);
    assert_eq!(
        events(&config.output_dir.join(KEPT_FILE)),
        ["crash, queen up"]
    );

    let report = fs::read_to_string(config.output_dir.join(REPORT_FILE)).unwrap();
    assert_eq!(
        report,
        "White: Gamma | Black: Alpha | Result: 0-1 | Fault: White (win on time)\n\
         White: Beta | Black: Gamma | Result: 1-0 | Fault: Black (win on time)\n"
    );
    let totals = fs::read_to_string(config.output_dir.join(TOTALS_FILE)).unwrap();
    assert_eq!(totals, "Gamma = 2\n");
    assert!(!config.output_dir.join(SENTINEL_FILE).exists());
}

fn selector(args: &[&str]) -> std::process::Output {
    Command::new(SELECTOR).args(args).output().unwrap()
}

#[test]
fn test_cli_select_and_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let out: PathBuf = config.output_dir.clone();
    let input = config.input.to_str().unwrap();
    let out_str = out.to_str().unwrap();

    let args = [
        "select",
        "--input",
        input,
        "--engine",
        ENGINE,
        "--output-dir",
        out_str,
        "--move-time-sec",
        "0.01",
        "--no-progress",
    ];
    for _ in 0..2 {
        let output = selector(&args);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    }

    assert_eq!(events(&out.join("good.pgn")).len(), 4);
    assert_eq!(events(&out.join("bad.pgn")).len(), 4);
    assert_eq!(
        fs::read_to_string(out.join(TOTALS_FILE)).unwrap(),
        "Gamma = 4\n"
    );
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(summary["bad"], 2);

    let totals = out.join(TOTALS_FILE);
    fs::write(&totals, "Gamma = 4\nDelta = 1\nGamma = 1\n").unwrap();
    let output = selector(&["merge-totals", totals.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&totals).unwrap(),
        "Gamma = 5\nDelta = 1\n"
    );
}

#[test]
fn test_cli_reports_failed_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let output = selector(&[
        "select",
        "--input",
        config.input.to_str().unwrap(),
        "--engine",
        "/nonexistent/engine",
        "--output-dir",
        config.output_dir.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration stage failed"), "{stderr}");
    // Nothing is written before configuration passes.
    assert!(!config.output_dir.exists());

    let output = selector(&[
        "select",
        "--input",
        config.input.to_str().unwrap(),
        "--engine",
        ENGINE,
        "--score-margin=-1",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("score margin"), "{stderr}");
}
