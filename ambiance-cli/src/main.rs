//! Ambiance CLI: real-time player and offline renderer for procedural soundscapes.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use ambiance_engine::{
    AudioBackend, CpalBackend, DeviceRequest, EngineConfig, ManualBackend, PlaybackController, RecipeTable,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

/// Metering / teardown poll interval of the interactive player.
const POLL_INTERVAL: Duration = Duration::from_millis(150);
/// Meter log cadence, in poll ticks (~1 s).
const METER_EVERY: u32 = 7;

#[derive(Parser, Debug)]
#[command(name = "ambiance", version, about = "Procedural ambient soundscapes")]
struct Cli {
    /// Recipe table (JSON); defaults to the built-in table
    #[arg(long, global = true)]
    recipes: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List output devices of the default host
    ListDevices,

    /// List sound ids by role
    ListSounds,

    /// Play on an output device; reads commands from stdin
    Play {
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        sample_rate: Option<u32>,
        #[arg(long)]
        channels: Option<u16>,
        /// Background to start with
        #[arg(long)]
        background: Option<String>,
        /// Asset to start with (repeatable)
        #[arg(long = "asset")]
        assets: Vec<String>,
        /// Master volume in [0, 1]
        #[arg(long)]
        volume: Option<f32>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Render offline to a 32-bit float mono WAV file
    Render {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long)]
        background: Option<String>,
        #[arg(long = "asset")]
        assets: Vec<String>,
        /// Background to crossfade to during the render
        #[arg(long, requires = "switch_at")]
        switch_to: Option<String>,
        /// Time (seconds) of the crossfade
        #[arg(long, requires = "switch_to")]
        switch_at: Option<f64>,
        #[arg(long)]
        sample_rate: Option<u32>,
        #[arg(long)]
        volume: Option<f32>,
        /// RNG seed for a reproducible render
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn load_recipes(path: Option<&Path>) -> Result<RecipeTable> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            RecipeTable::from_json(&text).with_context(|| format!("loading recipes from {}", p.display()))
        }
        None => RecipeTable::builtin().context("loading built-in recipes"),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            EngineConfig::from_json(&text).with_context(|| format!("loading config from {}", p.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn list_sounds(recipes: &RecipeTable) {
    println!("Backgrounds:");
    for r in recipes.backgrounds() {
        println!("- {:<20} {} layers", r.id, r.layers.len());
    }
    println!("Assets:");
    for r in recipes.assets() {
        println!("- {:<20} {} layers", r.id, r.layers.len());
    }
}

// ------------------------------ Interactive commands ------------------------------

#[derive(Debug, PartialEq)]
enum Command {
    Background(String),
    Play(String),
    Stop(String),
    StopBackground,
    Volume(f32),
    ChannelVolume(String, f32),
    Mute(bool),
    List,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| "empty command".to_string())?;
    let mut arg = |what: &str| words.next().map(str::to_owned).ok_or_else(|| format!("`{verb}` needs {what}"));
    let volume = |s: String| s.parse::<f32>().map_err(|_| format!("not a volume: {s}"));

    let cmd = match verb {
        "bg" => Command::Background(arg("a sound id")?),
        "play" => Command::Play(arg("a sound id")?),
        "stop" => Command::Stop(arg("a sound id")?),
        "stopbg" => Command::StopBackground,
        "vol" => Command::Volume(volume(arg("a volume")?)?),
        "chvol" => {
            let id = arg("a sound id")?;
            Command::ChannelVolume(id, volume(arg("a volume")?)?)
        }
        "mute" => Command::Mute(true),
        "unmute" => Command::Mute(false),
        "list" => Command::List,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(cmd)
}

/// Apply one command. Returns false on `quit`.
fn apply<B: AudioBackend>(c: &mut PlaybackController<B>, cmd: Command) -> bool {
    match cmd {
        Command::Background(id) => c.play_background(&id),
        Command::Play(id) => c.play_asset(&id),
        Command::Stop(id) => c.stop_asset(&id),
        Command::StopBackground => c.stop_background(),
        Command::Volume(v) => c.set_master_volume(v),
        Command::ChannelVolume(id, v) => c.set_channel_volume(&id, v),
        Command::Mute(m) => c.set_mute(m),
        Command::List => {
            for id in c.active_sound_ids() {
                println!("{id:<20} level {:.3}  volume {:.2}", c.channel_level(&id), c.channel_volume(&id));
            }
        }
        Command::Quit => return false,
    }
    true
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[allow(clippy::too_many_arguments)]
fn play(
    recipes: RecipeTable,
    config: EngineConfig,
    request: DeviceRequest,
    background: Option<String>,
    assets: Vec<String>,
    volume: Option<f32>,
    duration: Option<f64>,
) -> Result<()> {
    let mut c = PlaybackController::new(CpalBackend::new(request), recipes, config)?;
    if let Some(v) = volume {
        c.set_master_volume(v);
    }
    if let Some(bg) = &background {
        c.play_background(bg);
    }
    for a in &assets {
        c.play_asset(a);
    }
    if let Some(name) = c.backend().device_name() {
        info!(device = name, sample_rate = c.backend().sample_rate(), "playing");
    }
    println!("Commands: bg <id> | play <id> | stop <id> | stopbg | vol <v> | chvol <id> <v> | mute | unmute | list | quit");

    let deadline = duration.map(|d| Instant::now() + Duration::from_secs_f64(d.max(0.0)));
    let lines = spawn_stdin_reader();
    let mut ticks = 0u32;

    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match parse_command(&line) {
                Ok(cmd) => {
                    if !apply(&mut c, cmd) {
                        break;
                    }
                }
                Err(e) => warn!("{e}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed: keep playing until the deadline (or forever)
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
        }

        c.poll();
        ticks += 1;
        if ticks % METER_EVERY == 0 && c.is_active() {
            let channels: Vec<String> = c
                .active_sound_ids()
                .into_iter()
                .map(|id| format!("{id}={:.2}", c.channel_level(&id)))
                .collect();
            info!(master = format_args!("{:.2}", c.master_level()), channels = ?channels, "meter");
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }
    Ok(())
}

// ------------------------------ Offline render ------------------------------

struct RenderPlan {
    seconds: f64,
    background: Option<String>,
    assets: Vec<String>,
    switch: Option<(String, f64)>,
    volume: Option<f32>,
}

fn render(recipes: RecipeTable, config: EngineConfig, out: &Path, plan: RenderPlan) -> Result<()> {
    const BLOCK: usize = 1024;

    for id in plan.background.iter().chain(&plan.assets).chain(plan.switch.as_ref().map(|(id, _)| id)) {
        if !recipes.contains(id) {
            bail!("unknown sound id: {id}");
        }
    }

    let sr = config.sample_rate;
    let mut c = PlaybackController::new(ManualBackend::new(sr), recipes, config)?;
    if let Some(v) = plan.volume {
        c.set_master_volume(v);
    }
    if let Some(bg) = &plan.background {
        c.play_background(bg);
    }
    for a in &plan.assets {
        c.play_asset(a);
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(out, spec).with_context(|| format!("creating {}", out.display()))?;

    let total = (plan.seconds.max(0.0) * f64::from(sr)).round() as usize;
    let mut switch = plan.switch;
    let mut buf = vec![0.0_f32; BLOCK];
    let mut done = 0;
    while done < total {
        if let Some((id, at)) = &switch {
            if c.current_time() >= *at {
                c.play_background(id);
                switch = None;
            }
        }
        let n = BLOCK.min(total - done);
        c.backend_mut().render_mono(&mut buf[..n]);
        for &s in &buf[..n] {
            writer.write_sample(s).context("writing samples")?;
        }
        c.poll();
        done += n;
    }
    writer.finalize().context("finalizing WAV")?;

    info!(
        path = %out.display(),
        seconds = plan.seconds,
        sample_rate = sr,
        "render complete"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let recipes = load_recipes(cli.recipes.as_deref())?;
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::ListDevices => {
            println!("Available output devices:");
            for name in ambiance_engine::realtime::list_output_devices()? {
                println!("- {name}");
            }
        }
        Commands::ListSounds => list_sounds(&recipes),
        Commands::Play { device, sample_rate, channels, background, assets, volume, duration } => {
            let request = DeviceRequest { device_name: device, sample_rate, channels };
            play(recipes, config, request, background, assets, volume, duration)?;
        }
        Commands::Render { out, seconds, background, assets, switch_to, switch_at, sample_rate, volume, seed } => {
            if let Some(sr) = sample_rate {
                config.sample_rate = sr;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            config.validate()?;
            let plan = RenderPlan { seconds, background, assets, switch: switch_to.zip(switch_at), volume };
            render(recipes, config, &out, plan)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("bg forest-night"), Ok(Command::Background("forest-night".into())));
        assert_eq!(parse_command("  play desk-fan "), Ok(Command::Play("desk-fan".into())));
        assert_eq!(parse_command("stopbg"), Ok(Command::StopBackground));
        assert_eq!(parse_command("vol 0.4"), Ok(Command::Volume(0.4)));
        assert_eq!(parse_command("chvol desk-fan 0.3"), Ok(Command::ChannelVolume("desk-fan".into(), 0.3)));
        assert_eq!(parse_command("mute"), Ok(Command::Mute(true)));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("").is_err());
        assert!(parse_command("bg").is_err());
        assert!(parse_command("vol loud").is_err());
        assert!(parse_command("chvol desk-fan").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn render_writes_a_float_wav() {
        let dir = std::env::temp_dir().join(format!("ambiance-render-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join("mix.wav");
        let config = EngineConfig { sample_rate: 8_000, loop_seconds: 1.0, seed: Some(1), ..EngineConfig::default() };
        let plan = RenderPlan {
            seconds: 1.0,
            background: Some("ocean-coast".into()),
            assets: vec!["desk-fan".into()],
            switch: Some(("rain-city".into(), 0.5)),
            volume: None,
        };
        render(RecipeTable::builtin().unwrap(), config, &out, plan).unwrap();

        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.len(), 8_000);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn render_rejects_unknown_ids() {
        let out = std::env::temp_dir().join("ambiance-never-written.wav");
        let plan = RenderPlan { seconds: 1.0, background: Some("nope".into()), assets: vec![], switch: None, volume: None };
        assert!(render(RecipeTable::builtin().unwrap(), EngineConfig::default(), &out, plan).is_err());
    }
}
