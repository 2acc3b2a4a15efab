use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "liquidglass",
    author,
    version,
    about = "Headless liquid-glass refraction compositor"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture a page, run the glass renderer for a number of frames and export the overlay.
    Run(RunArgs),
    /// Validate a page description and configuration without touching the GPU.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Page description (`.toml` or `.json`).
    #[arg(value_name = "PAGE")]
    pub page: PathBuf,

    /// Renderer and lens configuration TOML.
    #[arg(long, value_name = "PATH", env = "LIQUIDGLASS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where to write the overlay PNG.
    #[arg(long, short, value_name = "PATH", default_value = "overlay.png")]
    pub output: PathBuf,

    /// Number of animation frames to simulate after the first capture.
    #[arg(long, value_name = "COUNT", default_value_t = 90)]
    pub frames: u32,

    /// Simulated frame interval in milliseconds.
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 16)]
    pub frame_ms: u64,

    /// Override the described viewport (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Override the described device pixel ratio.
    #[arg(long, value_name = "RATIO")]
    pub dpr: Option<f32>,

    /// Pointer path swept across the run, as `x,y` points separated by `;`.
    #[arg(long, value_name = "POINTS", value_parser = parse_pointer_path)]
    pub pointer: Option<PointerPath>,
}

/// Viewport-space points the simulated pointer visits in order.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerPath(pub Vec<(f32, f32)>);

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Page description (`.toml` or `.json`).
    #[arg(value_name = "PAGE")]
    pub page: PathBuf,

    /// Renderer and lens configuration TOML.
    #[arg(long, value_name = "PATH", env = "LIQUIDGLASS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the resolved lenses as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32), String> {
    let (width, height) = spec
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{width}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{height}'"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_pointer_path(spec: &str) -> Result<PointerPath, String> {
    let points = spec
        .split(';')
        .map(str::trim)
        .filter(|point| !point.is_empty())
        .map(|point| {
            let (x, y) = point
                .split_once(',')
                .ok_or_else(|| format!("pointer point '{point}' must be 'x,y'"))?;
            let x: f32 = x.trim().parse().map_err(|_| format!("invalid x in '{point}'"))?;
            let y: f32 = y.trim().parse().map_err(|_| format!("invalid y in '{point}'"))?;
            Ok((x, y))
        })
        .collect::<Result<Vec<_>, String>>()?;
    if points.is_empty() {
        return Err("pointer path needs at least one point".to_string());
    }
    Ok(PointerPath(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_surface_size() {
        assert_eq!(parse_surface_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_surface_size(" 640 X 480 "), Ok((640, 480)));
        assert!(parse_surface_size("0x480").is_err());
        assert!(parse_surface_size("wide").is_err());
    }

    #[test]
    fn parses_pointer_path() {
        assert_eq!(
            parse_pointer_path("10,20; 30.5,40;"),
            Ok(PointerPath(vec![(10.0, 20.0), (30.5, 40.0)]))
        );
        assert!(parse_pointer_path("").is_err());
        assert!(parse_pointer_path("10;20").is_err());
    }

    #[test]
    fn run_args_parse() {
        let cli = Cli::try_parse_from([
            "liquidglass",
            "run",
            "page.toml",
            "--frames",
            "3",
            "--pointer",
            "1,2;3,4",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.frames, 3);
        assert_eq!(args.pointer.unwrap().0.len(), 2);
        assert_eq!(args.output, PathBuf::from("overlay.png"));
    }
}
