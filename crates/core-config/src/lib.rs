//! Configuration loading and parsing.
//!
//! Parses `warpedit.toml` (or an override path provided by the binary). Every
//! section is optional and every field has a default, so a missing or partial
//! file is never an error. Unknown fields are ignored to allow forward
//! evolution.
//!
//! Raw parsed values are retained; `Config::apply_context` derives the
//! effective (clamped) values once the screen geometry is known and again on
//! every screen change. Clamps are logged at `info` under target `config`.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// Hard bounds on the auto-repeat interval after the initial delay.
pub const REPEAT_FLOOR_MS: u32 = 100;
pub const REPEAT_CEIL_MS: u32 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigContext {
    /// Physical display size in pixels.
    pub screen_width: u32,
    pub screen_height: u32,
}

impl ConfigContext {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            screen_width,
            screen_height,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WarpConfig {
    #[serde(default = "WarpConfig::default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "WarpConfig::default_clamp_inset")]
    pub clamp_inset: u32,
    #[serde(default = "WarpConfig::default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            retry_limit: Self::default_retry_limit(),
            clamp_inset: Self::default_clamp_inset(),
            stall_timeout_ms: Self::default_stall_timeout_ms(),
        }
    }
}

impl WarpConfig {
    const fn default_retry_limit() -> u32 {
        5
    }
    const fn default_clamp_inset() -> u32 {
        3
    }
    const fn default_stall_timeout_ms() -> u64 {
        500
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScrollbarConfig {
    #[serde(default = "ScrollbarConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "ScrollbarConfig::default_thickness")]
    pub thickness: u32,
    #[serde(default = "ScrollbarConfig::default_arrow_size")]
    pub arrow_size: u32,
    #[serde(default = "ScrollbarConfig::default_min_slider")]
    pub min_slider: u32,
    #[serde(default)]
    pub auto_hide: bool,
    #[serde(default = "ScrollbarConfig::default_initial_delay_ms")]
    pub initial_delay_ms: u32,
    #[serde(default = "ScrollbarConfig::default_repeat_start_ms")]
    pub repeat_start_ms: u32,
    #[serde(default = "ScrollbarConfig::default_repeat_min_ms")]
    pub repeat_min_ms: u32,
    #[serde(default = "ScrollbarConfig::default_repeat_step_ms")]
    pub repeat_step_ms: u32,
}

impl Default for ScrollbarConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            thickness: Self::default_thickness(),
            arrow_size: Self::default_arrow_size(),
            min_slider: Self::default_min_slider(),
            auto_hide: false,
            initial_delay_ms: Self::default_initial_delay_ms(),
            repeat_start_ms: Self::default_repeat_start_ms(),
            repeat_min_ms: Self::default_repeat_min_ms(),
            repeat_step_ms: Self::default_repeat_step_ms(),
        }
    }
}

impl ScrollbarConfig {
    const fn default_enabled() -> bool {
        true
    }
    const fn default_thickness() -> u32 {
        11
    }
    const fn default_arrow_size() -> u32 {
        11
    }
    const fn default_min_slider() -> u32 {
        6
    }
    const fn default_initial_delay_ms() -> u32 {
        500
    }
    const fn default_repeat_start_ms() -> u32 {
        250
    }
    const fn default_repeat_min_ms() -> u32 {
        100
    }
    const fn default_repeat_step_ms() -> u32 {
        25
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    #[serde(default = "IdleConfig::default_read_ahead_block")]
    pub read_ahead_block: usize,
    #[serde(default = "IdleConfig::default_search_budget")]
    pub search_budget: usize,
    #[serde(default = "IdleConfig::default_keydef_budget")]
    pub keydef_budget: usize,
    #[serde(default = "IdleConfig::default_progress_first")]
    pub progress_first: usize,
    #[serde(default = "IdleConfig::default_progress_factor")]
    pub progress_factor: usize,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            read_ahead_block: Self::default_read_ahead_block(),
            search_budget: Self::default_search_budget(),
            keydef_budget: Self::default_keydef_budget(),
            progress_first: Self::default_progress_first(),
            progress_factor: Self::default_progress_factor(),
        }
    }
}

impl IdleConfig {
    const fn default_read_ahead_block() -> usize {
        256
    }
    const fn default_search_budget() -> usize {
        2000
    }
    const fn default_keydef_budget() -> usize {
        64
    }
    const fn default_progress_first() -> usize {
        1000
    }
    const fn default_progress_factor() -> usize {
        2
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DisplayConfig {
    #[serde(default = "DisplayConfig::default_title_rows")]
    pub title_rows: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title_rows: Self::default_title_rows(),
        }
    }
}

impl DisplayConfig {
    const fn default_title_rows() -> u32 {
        1
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub warp: WarpConfig,
    #[serde(default)]
    pub scrollbar: ScrollbarConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Values derived from the raw file once runtime context is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effective {
    pub retry_limit: u32,
    pub clamp_inset: u32,
    pub repeat_start_ms: u32,
    pub repeat_min_ms: u32,
    pub progress_factor: usize,
}

impl Default for Effective {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            retry_limit: file.warp.retry_limit,
            clamp_inset: file.warp.clamp_inset,
            repeat_start_ms: file.scrollbar.repeat_start_ms,
            repeat_min_ms: file.scrollbar.repeat_min_ms,
            progress_factor: file.idle.progress_factor,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
    pub effective: Effective,
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from("warpedit.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("warpedit").join("warpedit.toml");
    }
    PathBuf::from("warpedit.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            let mut cfg = Config {
                raw: Some(content),
                file,
                effective: Effective::default(),
            };
            cfg.clamp_static();
            Ok(cfg)
        }
        Err(e) => {
            // Parse errors fall back to defaults; the editor must still start.
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Clamp values that do not depend on the screen.
    fn clamp_static(&mut self) {
        let sb = &self.file.scrollbar;
        let start = sb.repeat_start_ms.clamp(REPEAT_FLOOR_MS, REPEAT_CEIL_MS);
        let min = sb.repeat_min_ms.clamp(REPEAT_FLOOR_MS, start);
        if start != sb.repeat_start_ms || min != sb.repeat_min_ms {
            info!(
                target: "config",
                raw_start = sb.repeat_start_ms,
                raw_min = sb.repeat_min_ms,
                start,
                min,
                "scrollbar_repeat_clamped"
            );
        }
        let retry_limit = self.file.warp.retry_limit.max(1);
        if retry_limit != self.file.warp.retry_limit {
            info!(target: "config", raw = self.file.warp.retry_limit, retry_limit, "warp_retry_limit_clamped");
        }
        self.effective.repeat_start_ms = start;
        self.effective.repeat_min_ms = min;
        self.effective.retry_limit = retry_limit;
        self.effective.progress_factor = self.file.idle.progress_factor.max(2);
        self.effective.clamp_inset = self.file.warp.clamp_inset;
    }

    /// Apply screen context. The warp clamp inset must leave at least one
    /// addressable pixel on the smaller screen axis. Returns the effective
    /// inset.
    pub fn apply_context(&mut self, ctx: ConfigContext) -> u32 {
        self.clamp_static();
        let raw = self.file.warp.clamp_inset;
        let smallest = ctx.screen_width.min(ctx.screen_height);
        let max = smallest.saturating_sub(1) / 2;
        let clamped = raw.min(max);
        if clamped != raw {
            info!(
                target: "config",
                raw,
                clamped,
                max,
                screen_width = ctx.screen_width,
                screen_height = ctx.screen_height,
                "warp_clamp_inset_clamped"
            );
        }
        self.effective.clamp_inset = clamped;
        clamped
    }

    /// Recompute on a screen change. Returns `Some(new_inset)` when the
    /// effective value changed, else `None`.
    pub fn recompute_with_context(&mut self, ctx: ConfigContext) -> Option<u32> {
        let prev = self.effective.clamp_inset;
        let current = self.apply_context(ctx);
        if current != prev { Some(current) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), body).unwrap();
        tmp
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file.warp.retry_limit, 5);
        assert_eq!(cfg.file.warp.clamp_inset, 3);
        assert_eq!(cfg.file.scrollbar.arrow_size, 11);
        assert_eq!(cfg.file.scrollbar.initial_delay_ms, 500);
        assert_eq!(cfg.file.idle.progress_first, 1000);
        assert_eq!(cfg.file.display.title_rows, 1);
        assert!(cfg.raw.is_none());
    }

    #[test]
    fn parses_partial_sections() {
        let tmp = write_config("[warp]\nretry_limit = 8\n[scrollbar]\nauto_hide = true\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.warp.retry_limit, 8);
        assert_eq!(cfg.effective.retry_limit, 8);
        assert!(cfg.file.scrollbar.auto_hide);
        // untouched fields keep defaults
        assert_eq!(cfg.file.warp.clamp_inset, 3);
        assert_eq!(cfg.file.scrollbar.min_slider, 6);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let tmp = write_config("[warp\nretry_limit = ");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file, ConfigFile::default());
    }

    #[test]
    fn repeat_intervals_clamped_into_band() {
        let tmp = write_config("[scrollbar]\nrepeat_start_ms = 900\nrepeat_min_ms = 10\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.effective.repeat_start_ms, REPEAT_CEIL_MS);
        assert_eq!(cfg.effective.repeat_min_ms, REPEAT_FLOOR_MS);
    }

    #[test]
    fn zero_retry_limit_is_raised_to_one() {
        let tmp = write_config("[warp]\nretry_limit = 0\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.effective.retry_limit, 1);
    }

    #[test]
    fn inset_clamped_against_tiny_screen() {
        let tmp = write_config("[warp]\nclamp_inset = 40\n");
        let mut cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.apply_context(ConfigContext::new(1024, 768)), 40);
        let changed = cfg.recompute_with_context(ConfigContext::new(30, 20));
        // (20 - 1) / 2 = 9
        assert_eq!(changed, Some(9));
        assert_eq!(cfg.recompute_with_context(ConfigContext::new(31, 20)), None);
    }

    #[test]
    fn clamp_logging_uses_config_target() {
        let tmp = write_config("[warp]\nclamp_inset = 50\n");
        let mut cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        with_default(subscriber, || {
            cfg.apply_context(ConfigContext::new(80, 24));
        });

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("INFO config:"));
        assert!(log_output.contains("warp_clamp_inset_clamped"));
        assert_eq!(cfg.effective.clamp_inset, 11);
    }
}
