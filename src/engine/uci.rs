use std::collections::{BTreeMap, HashSet};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, warn};
use shakmaty::{Color, fen::Fen};

use super::Engine;
use crate::error::EngineError;
use crate::types::{EngineMove, Evaluation};

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Settings used when launching a UCI engine process.
#[derive(Debug, Clone)]
pub struct UciConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Fixed search depth for every query.
    pub depth: u32,
    pub hash_mb: u32,
    pub threads: usize,
    /// Extra options in `Name=Value` form.
    pub options: Vec<String>,
    /// Longest time to wait for a single search to finish.
    pub timeout: Duration,
}

impl Default for UciConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            depth: 15,
            hash_mb: 1024,
            threads: 1,
            options: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Last reported principal variation for one `multipv` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PvLine {
    multipv: usize,
    score: Evaluation,
    first_move: Option<String>,
}

/// One running UCI engine process.
///
/// The handle is meant to live for a whole worker: it is spawned once,
/// reused for every game, and shut down on drop.
pub struct UciEngine {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    opt_names: HashSet<String>,
    label: String,
    depth: u32,
    timeout: Duration,
    position: Option<(String, Color)>,
    multipv: usize,
    needs_resync: bool,
}

impl UciEngine {
    pub fn spawn(cfg: &UciConfig, label: impl Into<String>) -> Result<Self, EngineError> {
        let label = label.into();
        let mut child = Command::new(&cfg.path)
            .args(&cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: cfg.path.clone(),
                source,
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("engine stdout unavailable"))?;

        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        thread::Builder::new()
            .name(format!("{label}-stdout"))
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            if tx.send(l).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })?;

        let mut engine = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            opt_names: HashSet::new(),
            label,
            depth: cfg.depth,
            timeout: cfg.timeout,
            position: None,
            multipv: 1,
            needs_resync: false,
        };
        engine.initialize(cfg)?;
        debug!("{}: engine ready ({})", engine.label, cfg.path.display());
        Ok(engine)
    }

    fn initialize(&mut self, cfg: &UciConfig) -> Result<(), EngineError> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.opt_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }

        self.set_option_if_available("Threads", &cfg.threads.to_string())?;
        self.set_option_if_available("Hash", &cfg.hash_mb.to_string())?;
        for opt in &cfg.options {
            match opt.split_once('=') {
                Some((name, value)) => self.set_option_if_available(name.trim(), value.trim())?,
                None => self.write_line(&format!("setoption name {}", opt.trim()))?,
            }
        }
        self.sync_ready()?;
        self.write_line("ucinewgame")?;
        self.sync_ready()
    }

    pub fn sync_ready(&mut self) -> Result<(), EngineError> {
        self.write_line("isready")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line == "readyok" {
                return Ok(());
            }
        }
    }

    /// Stop the search left over from a timed-out query and drop its output.
    ///
    /// An engine may answer `isready` before the stopped search reports, so
    /// both its `bestmove` and the `readyok` have to be read.
    fn resync(&mut self) -> Result<(), EngineError> {
        warn!("{}: resynchronizing after an unanswered search", self.label);
        self.write_line("stop")?;
        self.write_line("isready")?;
        let (mut stopped, mut ready) = (false, false);
        while !(stopped && ready) {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if line.starts_with("bestmove") {
                stopped = true;
            } else if line == "readyok" {
                ready = true;
            }
        }
        self.needs_resync = false;
        Ok(())
    }

    fn recv_line(&self, timeout: Duration) -> Result<String, EngineError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => EngineError::Timeout {
                label: self.label.clone(),
                timeout,
            },
            RecvTimeoutError::Disconnected => EngineError::Exited(self.label.clone()),
        })
    }

    fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if self.opt_names.is_empty() || self.opt_names.contains(name) {
            self.write_line(&format!("setoption name {} value {}", name, value))?;
        }
        Ok(())
    }

    fn write_line(&mut self, msg: &str) -> Result<(), EngineError> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Run a fixed-depth search with `multipv` lines on the current position
    /// and return the final line per slot, best first.
    fn search(&mut self, multipv: usize) -> Result<(Color, Vec<PvLine>), EngineError> {
        let (fen, turn) = self.position.clone().ok_or(EngineError::NoPosition)?;

        if self.needs_resync {
            self.resync()?;
        }
        if self.multipv != multipv {
            self.write_line(&format!("setoption name MultiPV value {multipv}"))?;
            self.multipv = multipv;
        }
        self.write_line(&format!("position fen {fen}"))?;
        self.write_line(&format!("go depth {}", self.depth))?;

        let deadline = Instant::now() + self.timeout;
        let mut lines: BTreeMap<usize, PvLine> = BTreeMap::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(line) => {
                    if let Some(pv) = parse_info(&line) {
                        lines.insert(pv.multipv, pv);
                    } else if line.starts_with("bestmove") {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.needs_resync = true;
                    return Err(EngineError::Timeout {
                        label: self.label.clone(),
                        timeout: self.timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Exited(self.label.clone()));
                }
            }
        }

        if lines.is_empty() {
            return Err(EngineError::Protocol(format!(
                "{}: search on '{fen}' finished without a score",
                self.label
            )));
        }
        Ok((turn, lines.into_values().collect()))
    }
}

impl Engine for UciEngine {
    fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        let parsed: Fen = fen.parse().map_err(|e| EngineError::InvalidPosition {
            fen: fen.to_string(),
            reason: format!("{e}"),
        })?;
        let turn = parsed.into_setup().turn;
        self.position = Some((fen.to_string(), turn));
        Ok(())
    }

    fn evaluate(&mut self) -> Result<Evaluation, EngineError> {
        let (turn, lines) = self.search(1)?;
        let best = lines
            .first()
            .ok_or_else(|| EngineError::Protocol("no principal variation".to_string()))?;
        Ok(white_relative(best.score, turn))
    }

    fn top_moves(&mut self, k: usize) -> Result<Vec<EngineMove>, EngineError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let (turn, lines) = self.search(k)?;
        Ok(lines
            .into_iter()
            .filter_map(|line| {
                line.first_move.map(|uci| EngineMove {
                    uci,
                    evaluation: white_relative(line.score, turn),
                })
            })
            .take(k)
            .collect())
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// UCI scores are relative to the side to move.
fn white_relative(score: Evaluation, turn: Color) -> Evaluation {
    if turn.is_white() {
        score
    } else {
        score.flipped()
    }
}

/// Parse an `info` line that carries an exact score. Bound scores and
/// `info string` lines yield `None`.
fn parse_info(line: &str) -> Option<PvLine> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }

    let mut multipv = 1usize;
    let mut score = None;
    let mut first_move = None;
    while let Some(tok) = tokens.next() {
        match tok {
            "string" => return None,
            "lowerbound" | "upperbound" => return None,
            "multipv" => multipv = tokens.next()?.parse().ok()?,
            "score" => {
                let kind = tokens.next()?;
                let value: i32 = tokens.next()?.parse().ok()?;
                score = Some(match kind {
                    "cp" => Evaluation::Centipawns(value),
                    "mate" => Evaluation::Mate(value),
                    _ => return None,
                });
            }
            "pv" => {
                first_move = tokens.next().map(str::to_string);
                break;
            }
            _ => {}
        }
    }

    Some(PvLine {
        multipv,
        score: score?,
        first_move,
    })
}

fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace().peekable();
    while let Some(tok) = tokens.next() {
        if tok == "name" {
            let mut parts = Vec::new();
            while let Some(next) = tokens.next_if(|t| *t != "type") {
                parts.push(next);
            }
            if !parts.is_empty() {
                return Some(parts.join(" "));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_cp_with_pv() {
        let line = "info depth 15 seldepth 21 multipv 2 score cp -34 nodes 123 nps 1000 pv d7d5 e4d5";
        assert_eq!(
            parse_info(line),
            Some(PvLine {
                multipv: 2,
                score: Evaluation::Centipawns(-34),
                first_move: Some("d7d5".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_info_mate_without_multipv() {
        let line = "info depth 0 score mate 0";
        let pv = parse_info(line).unwrap();
        assert_eq!(pv.multipv, 1);
        assert_eq!(pv.score, Evaluation::Mate(0));
        assert_eq!(pv.first_move, None);
    }

    #[test]
    fn test_parse_info_skips_bounds_strings_and_scoreless_lines() {
        assert_eq!(parse_info("info depth 12 score cp 20 lowerbound pv e2e4"), None);
        assert_eq!(parse_info("info string NNUE evaluation using nn.nnue"), None);
        assert_eq!(parse_info("info depth 3 currmove e2e4 currmovenumber 1"), None);
        assert_eq!(parse_info("bestmove e2e4 ponder e7e5"), None);
    }

    #[test]
    fn test_white_relative() {
        assert_eq!(
            white_relative(Evaluation::Centipawns(50), Color::Black),
            Evaluation::Centipawns(-50)
        );
        assert_eq!(white_relative(Evaluation::Mate(2), Color::White), Evaluation::Mate(2));
    }

    #[test]
    fn test_parse_option_name_multi_word() {
        assert_eq!(
            parse_option_name("name Skill Level type spin default 20 min 0 max 20"),
            Some("Skill Level".to_string())
        );
        assert_eq!(parse_option_name("type check"), None);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;

        // SLOW_FIRST leaves the first search unanswered until `stop`.
        // STALE_AFTER_READY instead reports it only after the next `readyok`.
        const FAKE_ENGINE: &str = r#"n=0
pending=0
while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "option name Hash type spin default 16 min 1 max 1024"; echo "option name MultiPV type spin default 1 min 1 max 500"; echo "uciok";;
    isready)
      echo "readyok"
      if [ "$pending" = "1" ] && [ "$STALE_AFTER_READY" = "1" ]; then
        echo "info depth 9 multipv 1 score cp 999 pv a2a3"
        echo "bestmove a2a3"
        pending=0
      fi;;
    stop)
      if [ "$pending" = "1" ] && [ "$STALE_AFTER_READY" != "1" ]; then
        echo "bestmove e2e4"
        pending=0
      fi;;
    go*)
      n=$((n+1))
      if [ "$SLOW_FIRST" = "1" ] && [ "$n" -eq 1 ]; then pending=1; continue; fi
      echo "info depth 1 multipv 1 score cp 31 nodes 20 pv e2e4 e7e5"
      echo "info depth 1 multipv 2 score cp 12 nodes 20 pv d2d4"
      echo "bestmove e2e4";;
    quit) exit 0;;
  esac
done
"#;

        /// `env` holds shell assignments run before the fake engine loop.
        fn fake_config(dir: &std::path::Path, env: &str) -> UciConfig {
            let script = dir.join("fake_engine.sh");
            fs::write(&script, format!("{env}{FAKE_ENGINE}")).unwrap();
            UciConfig {
                path: PathBuf::from("sh"),
                args: vec![script.display().to_string()],
                timeout: Duration::from_millis(500),
                ..UciConfig::default()
            }
        }

        const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

        #[test]
        fn test_uci_engine_evaluate_and_top_moves() {
            let dir = tempfile::tempdir().unwrap();
            let mut engine = UciEngine::spawn(&fake_config(dir.path(), ""), "fake0").unwrap();

            engine.set_position(START).unwrap();
            assert_eq!(engine.evaluate().unwrap(), Evaluation::Centipawns(31));

            let top = engine.top_moves(2).unwrap();
            assert_eq!(top.len(), 2);
            assert_eq!(top[0].uci, "e2e4");
            assert_eq!(top[1].evaluation, Evaluation::Centipawns(12));

            engine.set_position(AFTER_E4).unwrap();
            assert_eq!(engine.evaluate().unwrap(), Evaluation::Centipawns(-31));
            assert_eq!(engine.top_moves(1).unwrap().len(), 1);
        }

        #[test]
        fn test_uci_engine_requires_position() {
            let dir = tempfile::tempdir().unwrap();
            let mut engine = UciEngine::spawn(&fake_config(dir.path(), ""), "fake1").unwrap();
            assert!(matches!(engine.evaluate(), Err(EngineError::NoPosition)));
            assert!(matches!(
                engine.set_position("garbage"),
                Err(EngineError::InvalidPosition { .. })
            ));
        }

        #[test]
        fn test_uci_engine_recovers_after_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let cfg = fake_config(dir.path(), "SLOW_FIRST=1\n");
            let mut engine = UciEngine::spawn(&cfg, "fake2").unwrap();
            engine.set_position(START).unwrap();

            let err = engine.evaluate().unwrap_err();
            assert!(matches!(err, EngineError::Timeout { .. }));
            assert!(!err.is_fatal());

            assert_eq!(engine.evaluate().unwrap(), Evaluation::Centipawns(31));
        }

        #[test]
        fn test_uci_engine_ignores_output_reported_after_readyok() {
            let dir = tempfile::tempdir().unwrap();
            let cfg = fake_config(dir.path(), "SLOW_FIRST=1\nSTALE_AFTER_READY=1\n");
            let mut engine = UciEngine::spawn(&cfg, "fake3").unwrap();
            engine.set_position(START).unwrap();

            assert!(matches!(engine.evaluate(), Err(EngineError::Timeout { .. })));

            // The stopped search's cp 999 line arrives after readyok and must
            // not be taken as the answer to the next query.
            assert_eq!(engine.evaluate().unwrap(), Evaluation::Centipawns(31));
            let top = engine.top_moves(1).unwrap();
            assert_eq!(top[0].uci, "e2e4");
        }

        #[test]
        fn test_spawn_missing_binary() {
            let cfg = UciConfig {
                path: PathBuf::from("/nonexistent/engine-binary"),
                ..UciConfig::default()
            };
            let err = UciEngine::spawn(&cfg, "missing").err().unwrap();
            assert!(matches!(err, EngineError::Spawn { .. }));
            assert!(err.is_fatal());
        }
    }
}
