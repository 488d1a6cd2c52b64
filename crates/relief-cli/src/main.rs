use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;

use relief_cam::convert;
use relief_core::{Config, Origin, ScanDirection, ScanPattern, ToolKind, Unit};
use relief_field::DepthImage;
use relief_post::DEFAULT_HEADER;

#[derive(Parser)]
#[command(
    name = "relief-maker",
    version,
    about = "Convert a grayscale depth map into CNC relief-carving G-code"
)]
struct Cli {
    /// Input depth-map image (PNG, JPEG, TIFF, BMP, ...)
    image: PathBuf,

    /// Output G-code file; written to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file; the flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Unit system: mm or in
    #[arg(long)]
    units: Option<String>,

    /// Tool kind: ball, flat or v
    #[arg(long)]
    tool: Option<String>,

    /// Tool diameter in job units
    #[arg(long)]
    tool_diameter: Option<f64>,

    /// Included V-bit angle in degrees
    #[arg(long)]
    v_angle: Option<f64>,

    /// Physical length of the image's full height
    #[arg(long)]
    yscale: Option<f64>,

    /// Rapid clearance height
    #[arg(long)]
    z_safe: Option<f64>,

    /// Maximum carve depth (positive magnitude)
    #[arg(long)]
    z_cut: Option<f64>,

    /// Cutting feed rate, units per minute
    #[arg(long)]
    feed: Option<f64>,

    /// Plunge feed rate, units per minute
    #[arg(long)]
    plunge_feed: Option<f64>,

    /// Distance between adjacent scan lines
    #[arg(long)]
    stepover: Option<f64>,

    /// Maximum simplifier deviation
    #[arg(long)]
    tolerance: Option<f64>,

    /// Scan pattern: rows, columns or columns_then_rows
    #[arg(long)]
    scan_pattern: Option<String>,

    /// Scan direction: positive, negative, alternating, upmill, downmill
    #[arg(long)]
    scan_direction: Option<String>,

    /// Machine origin anchor, e.g. bot_left, mid_center, top_right
    #[arg(long)]
    origin: Option<String>,

    /// Carve lighter pixels deeper instead of darker ones
    #[arg(long)]
    invert: bool,

    /// Skip stretching the intensity range before scaling
    #[arg(long)]
    no_normalize: bool,

    /// Emit straight moves only (no G2/G3)
    #[arg(long)]
    disable_arcs: bool,

    /// Add a border pass along the unscanned axis
    #[arg(long)]
    cut_perimeter: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_toml(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli)?;

    let image = load_depth_image(&cli.image)?;
    let lines = convert(&config, &image)?;

    match &cli.output {
        Some(path) => {
            let mut file = fs::File::create(path)?;
            for line in &lines {
                writeln!(file, "{line}")?;
            }
            println!("G-code written to {} ({} lines)", path.display(), lines.len());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for line in &lines {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}

/// Decode the image into the engine's grayscale buffer: 16-bit grayscale
/// stays at full precision, everything else goes through 8-bit luminance.
fn load_depth_image(path: &Path) -> Result<DepthImage, Box<dyn std::error::Error>> {
    let decoded = image::open(path)?;
    let depth = match decoded {
        image::DynamicImage::ImageLuma16(im) => {
            let (w, h) = (im.width() as usize, im.height() as usize);
            DepthImage::from_gray16(im.as_raw(), w, h)?
        }
        other => {
            let luma = other.to_luma8();
            let (w, h) = (luma.width() as usize, luma.height() as usize);
            DepthImage::from_gray8(luma.as_raw(), w, h)?
        }
    };
    Ok(depth)
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(units) = &cli.units {
        config.units = match units.to_ascii_lowercase().as_str() {
            "mm" | "millimeters" => Unit::Millimeters,
            "in" | "inch" | "inches" => Unit::Inches,
            other => return Err(format!("unknown units '{other}' (expected mm or in)").into()),
        };
    }
    if let Some(kind) = &cli.tool {
        config.tool.kind = match kind.to_ascii_lowercase().as_str() {
            "ball" => ToolKind::Ball,
            "flat" => ToolKind::Flat,
            "v" | "vee" => ToolKind::Vee,
            other => return Err(format!("unknown tool kind '{other}'").into()),
        };
    }
    if let Some(d) = cli.tool_diameter {
        config.tool.diameter = d;
    }
    if let Some(a) = cli.v_angle {
        config.tool.v_angle = a;
    }
    if let Some(v) = cli.yscale {
        config.image_yscale = v;
    }
    if let Some(v) = cli.z_safe {
        config.z_safe = v;
    }
    if let Some(v) = cli.z_cut {
        config.z_cut = v;
    }
    if let Some(v) = cli.feed {
        config.feed = v;
    }
    if let Some(v) = cli.plunge_feed {
        config.plunge_feed = v;
    }
    if let Some(v) = cli.stepover {
        config.stepover = v;
    }
    if let Some(v) = cli.tolerance {
        config.tolerance = v;
    }
    if let Some(pattern) = &cli.scan_pattern {
        config.scan_pattern = match pattern.to_ascii_lowercase().as_str() {
            "rows" => ScanPattern::Rows,
            "columns" => ScanPattern::Columns,
            "columns_then_rows" | "columns_first" => ScanPattern::ColumnsThenRows,
            other => return Err(format!("unknown scan pattern '{other}'").into()),
        };
    }
    if let Some(direction) = &cli.scan_direction {
        let (parsed, known) = ScanDirection::parse_lenient(direction);
        config.scan_direction = parsed;
        if !known {
            // Surface the fallback inside the program itself; keep the
            // default prologue intact when no custom header is set.
            eprintln!("warning: unknown scan direction '{direction}', using alternating");
            if config.header_lines.is_empty() {
                config.header_lines.push(DEFAULT_HEADER.to_string());
            }
            config
                .header_lines
                .push(format!("(unknown scan direction '{direction}'; using alternating)"));
        }
    }
    if let Some(origin) = &cli.origin {
        config.origin = match origin.to_ascii_lowercase().as_str() {
            "top_left" | "top-left" => Origin::TopLeft,
            "top_center" | "top-center" => Origin::TopCenter,
            "top_right" | "top-right" => Origin::TopRight,
            "mid_left" | "mid-left" => Origin::MidLeft,
            "mid_center" | "mid-center" | "center" => Origin::MidCenter,
            "mid_right" | "mid-right" => Origin::MidRight,
            "bot_left" | "bot-left" => Origin::BotLeft,
            "bot_center" | "bot-center" => Origin::BotCenter,
            "bot_right" | "bot-right" => Origin::BotRight,
            "arc_center" | "arc-center" | "default" => Origin::ArcCenter,
            other => return Err(format!("unknown origin '{other}'").into()),
        };
    }
    if cli.invert {
        config.invert = true;
    }
    if cli.no_normalize {
        config.normalize = false;
    }
    if cli.disable_arcs {
        config.disable_arcs = true;
    }
    if cli.cut_perimeter {
        config.cut_perimeter = true;
    }
    Ok(())
}
