mod logger;

use apngdis::{AnimatedImage, DecodeOptions, Disassembler};
use clap::Parser;
use glob::glob;
use log::{error, info, warn, LevelFilter};
use logger::Logger;
use std::fs;
use std::path::{Path, PathBuf};
use writer::{Writer, WriterImage, WriterImageFrame};

#[derive(Parser, Debug)]
#[clap(name = "apngdis")]
struct Cli {
    #[arg(required = true)]
    path: String,

    #[arg(short, long, value_parser = ["pam", "png", "webp"], help = "Output format")]
    format: Option<String>,

    #[arg(short = 'o', long = "output-dir", help = "Output directory for extracted frames")]
    output_dir: Option<String>,

    #[arg(long, help = "Print the chunk structure as JSON instead of decoding")]
    info: bool,

    #[arg(long = "no-crc", help = "Skip chunk CRC verification")]
    no_crc: bool,

    #[arg(long, help = "Display scale; inferred from an @Nx file name suffix when omitted")]
    scale: Option<f64>,

    #[arg(long, help = "Decode the image without writing to a file")]
    void: bool,

    #[arg(short, long, help = "Log every chunk and frame")]
    verbose: bool,
}

fn get_files(path: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let mut files = Vec::new();
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let absolute_pattern = if Path::new(path).is_relative() {
        base_dir.join(path).to_string_lossy().into_owned()
    } else {
        path.to_string()
    };

    for entry in glob(&absolute_pattern)? {
        match entry {
            Ok(path) => {
                if !path.is_file() {
                    continue;
                }

                files.push(path);
            }
            Err(e) => warn!("{}", e),
        }
    }

    Ok(files)
}

/// Reads the display scale from names like `spinner@2x.png`.
fn scale_from_name(file: &Path) -> Option<f64> {
    let stem = file.file_stem()?.to_str()?;
    let (_, suffix) = stem.rsplit_once('@')?;
    let scale = suffix.strip_suffix('x')?.parse::<f64>().ok()?;

    (scale.is_finite() && scale > 0.0).then_some(scale)
}

fn get_output_path(file: &Path, output_dir: Option<&str>, format: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let file_stem = file
        .file_stem()
        .ok_or("Invalid file name")?
        .to_str()
        .ok_or("Invalid file stem")?;

    let output_path = if let Some(dir) = output_dir {
        let output_dir = Path::new(dir);

        if !output_dir.exists() {
            fs::create_dir_all(output_dir)?;
        }

        let output_dir = if output_dir.is_relative() {
            std::env::current_dir()?.join(output_dir)
        } else {
            output_dir.to_path_buf()
        };

        output_dir.join(format!("{}.{}", file_stem, format))
    } else {
        file.parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{}.{}", file_stem, format))
    };

    Ok(output_path)
}

fn image_to_writer_image(image: AnimatedImage) -> WriterImage {
    let (width, height) = (image.width(), image.height());
    let frames = image
        .into_frames()
        .into_iter()
        .map(|frame| WriterImageFrame {
            width: frame.width(),
            height: frame.height(),
            delay_ms: frame.duration().as_millis().min(u32::MAX as u128) as u32,
            pixels: frame.into_pixels(),
        })
        .collect();

    WriterImage { width, height, frames }
}

fn process_file(file: &Path, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("File: {}", file.display());

    let data = fs::read(file)?;
    let scale = cli.scale.or_else(|| scale_from_name(file)).unwrap_or(1.0);
    let options = DecodeOptions::new().with_verify_crc(!cli.no_crc).with_scale(scale);
    let disassembler = Disassembler::with_options(&data, options);

    if cli.info {
        let info = disassembler.get_info()?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let image = disassembler.decode()?;
    let (points_w, points_h) = image.size();

    info!(
        "{}x{} px ({}x{} pt), {} frames, {:.3}s, plays: {}, first frame hidden: {}",
        image.width(),
        image.height(),
        points_w,
        points_h,
        image.frames().len(),
        image.total_duration(),
        if image.loops_forever() { "forever".to_string() } else { image.num_plays().to_string() },
        image.first_frame_hidden()
    );

    if cli.void {
        return Ok(());
    }

    let format = cli.format.as_deref().unwrap_or("webp");
    let output_path = get_output_path(file, cli.output_dir.as_deref(), format)?;

    if let Some(parent) = output_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let writer_image = image_to_writer_image(image);
    match format {
        "pam" => {
            let stem = output_path.file_stem().and_then(|s| s.to_str()).ok_or("Invalid output file name")?;

            for (i, frame) in writer_image.frames.iter().enumerate() {
                let frame_path = output_path.with_file_name(format!("{}_frame_{}.pam", stem, i));
                info!("Writing to: {}", frame_path.display());
                Writer::write_pam(&frame_path, frame.width, frame.height, &frame.pixels)?;
            }
        }
        "png" => {
            for path in Writer::write_png_frames(&output_path, &writer_image)? {
                info!("Wrote: {}", path.display());
            }
        }
        _ => {
            info!("Writing to: {}", output_path.display());
            Writer::write_webp(&output_path, &writer_image)?;
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    Logger::init(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info })?;

    let files = get_files(&cli.path)?;

    if files.is_empty() {
        error!("No files found matching pattern: {}", cli.path);
        return Ok(());
    }

    for file in files {
        if let Err(err) = process_file(&file, &cli) {
            error!("Error processing {}: {}", file.display(), err);
            continue;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scale_suffix() {
        assert_eq!(scale_from_name(Path::new("spinner@2x.png")), Some(2.0));
        assert_eq!(scale_from_name(Path::new("dir/ball@3x.apng")), Some(3.0));
        assert_eq!(scale_from_name(Path::new("ball.png")), None);
        assert_eq!(scale_from_name(Path::new("ball@0x.png")), None);
        assert_eq!(scale_from_name(Path::new("me@home.png")), None);
    }

    #[test]
    fn output_path_swaps_extension() {
        let path = get_output_path(Path::new("/tmp/anim/ball.png"), None, "webp").unwrap();

        assert_eq!(path, PathBuf::from("/tmp/anim/ball.webp"));
    }

    #[test]
    fn writer_image_takes_decoded_frames() {
        let data = writer::ApngBuilder::new(1, 1)
            .frame(writer::FrameSpec::full(1, 1, 1, 4), vec![1, 2, 3, 4])
            .frame(writer::FrameSpec::full(1, 1, 3, 4), vec![5, 6, 7, 8])
            .build();
        let image = apngdis::decode(&data).unwrap();

        let out = image_to_writer_image(image);

        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.frames.len(), 2);
        assert_eq!(out.frames[0].delay_ms, 250);
        assert_eq!(out.frames[1].delay_ms, 750);
        assert_eq!(out.frames[1].pixels, vec![5, 6, 7, 8]);
    }
}
