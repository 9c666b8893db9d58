use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use moshkit::{
    AnimationDriver, EffectParams, FrameStore, PlaybackMode, PlaybackSpeed, run_pass,
};

#[derive(Parser, Debug)]
#[command(name = "moshkit", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a single frame of an image or GIF and write a PNG.
    Frame(FrameArgs),
    /// Step a GIF animation and write a numbered PNG sequence.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input image or GIF.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Effect parameters JSON (missing fields use their defaults).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Pipeline clock in seconds, drives the time-based effects.
    #[arg(long, default_value_t = 0.0)]
    time: f32,

    /// Frame index for animated inputs.
    #[arg(long, default_value_t = 0)]
    frame: usize,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input GIF.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output directory for frame_0000.png and onward.
    #[arg(long)]
    out_dir: PathBuf,

    /// Effect parameters JSON (missing fields use their defaults).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Number of frames to emit.
    #[arg(long, default_value_t = 30)]
    frames: u32,

    /// Tick length in milliseconds between emitted frames.
    #[arg(long, default_value_t = 33.0)]
    dt_ms: f32,

    /// Playback speed multiplier.
    #[arg(long, value_enum, default_value_t = SpeedChoice::X1)]
    speed: SpeedChoice,

    /// Playback mode.
    #[arg(long, value_enum, default_value_t = ModeChoice::Forward)]
    mode: ModeChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SpeedChoice {
    X025,
    X05,
    X1,
    X15,
    X2,
    X4,
}

impl From<SpeedChoice> for PlaybackSpeed {
    fn from(choice: SpeedChoice) -> Self {
        match choice {
            SpeedChoice::X025 => PlaybackSpeed::Quarter,
            SpeedChoice::X05 => PlaybackSpeed::Half,
            SpeedChoice::X1 => PlaybackSpeed::Normal,
            SpeedChoice::X15 => PlaybackSpeed::OneAndHalf,
            SpeedChoice::X2 => PlaybackSpeed::Double,
            SpeedChoice::X4 => PlaybackSpeed::Quadruple,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Forward,
    PingPong,
    Random,
}

impl From<ModeChoice> for PlaybackMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::Forward => PlaybackMode::Forward,
            ModeChoice::PingPong => PlaybackMode::PingPong,
            ModeChoice::Random => PlaybackMode::Random,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn read_params(path: Option<&Path>) -> anyhow::Result<EffectParams> {
    let Some(path) = path else {
        return Ok(EffectParams::default());
    };
    let f = File::open(path).with_context(|| format!("open params '{}'", path.display()))?;
    let params: EffectParams =
        serde_json::from_reader(BufReader::new(f)).context("parse params JSON")?;
    Ok(params.clamped())
}

fn load_store(path: &Path) -> anyhow::Result<FrameStore> {
    let is_gif = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"));

    if is_gif {
        let anim = moshkit::load_gif(path)?;
        Ok(FrameStore::from_frames(anim.width, anim.height, anim.frames))
    } else {
        let img = moshkit::load_image(path)?;
        Ok(FrameStore::from_still(img.width, img.height, img.pixels))
    }
}

fn write_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        path,
        pixels,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let params = read_params(args.params.as_deref())?;
    let mut store = load_store(&args.in_path)?;
    store.select(args.frame);
    let frame = store
        .current_frame()
        .context("input contains no frames")?;

    let mut out = vec![0u8; frame.pixels.len()];
    run_pass(
        &frame.pixels,
        store.width(),
        store.height(),
        &params,
        args.time,
        &mut out,
        &|| false,
    )?;

    write_png(&args.out, store.width(), store.height(), &out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let params = read_params(args.params.as_deref())?;
    let mut store = load_store(&args.in_path)?;
    let mut driver = AnimationDriver::default();
    let mut rng = rand::thread_rng();

    let speed = PlaybackSpeed::from(args.speed);
    let mode = PlaybackMode::from(args.mode);
    let (width, height) = (store.width(), store.height());
    let mut out = vec![0u8; (width * height * 4) as usize];
    let mut clock_s = 0.0f32;

    for i in 0..args.frames {
        let frame = store
            .current_frame()
            .context("input contains no frames")?;
        run_pass(
            &frame.pixels,
            width,
            height,
            &params,
            clock_s,
            &mut out,
            &|| false,
        )?;

        let path = args.out_dir.join(format!("frame_{i:04}.png"));
        write_png(&path, width, height, &out)?;

        clock_s += args.dt_ms / 1000.0;
        driver.tick(&mut store, args.dt_ms, speed, mode, &mut rng);
    }

    eprintln!(
        "wrote {} frames to {}",
        args.frames,
        args.out_dir.display()
    );
    Ok(())
}
