//! Replay depth recordings through the motion detector.

use clap::*;
use depth_loader::{create_source, FrameBuffers, FrameSource, RecordingWriter, SyntheticScene};
use depth_motion::prelude::v1::{Result, *};
use log::*;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};

/// Single CSV output row.
#[derive(Serialize)]
struct Row {
    frame: usize,
    subject: u8,
    moved: bool,
    area: f32,
    pixel_count: u32,
    average: f32,
    std_dev: f32,
    still_frames: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("depth-replay")
        .version(crate_version!())
        .author(crate_authors!())
        .subcommand_required(true)
        .subcommand(
            Command::new("analyse")
                .about("Run a recording through the motion detector")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .takes_value(true)
                        .required(true),
                )
                .arg(Arg::new("config").long("config").short('c').takes_value(true))
                .arg(
                    Arg::new("set")
                        .long("set")
                        .short('s')
                        .takes_value(true)
                        .multiple_occurrences(true),
                )
                .arg(
                    Arg::new("still")
                        .long("still")
                        .takes_value(true)
                        .default_value("30"),
                )
                .arg(Arg::new("output").long("output").short('o').takes_value(true)),
        )
        .subcommand(
            Command::new("synth")
                .about("Write a synthetic recording")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::new("width")
                        .long("width")
                        .takes_value(true)
                        .default_value("512"),
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .takes_value(true)
                        .default_value("424"),
                )
                .arg(
                    Arg::new("frames")
                        .long("frames")
                        .short('f')
                        .takes_value(true)
                        .default_value("300"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .takes_value(true)
                        .default_value("0"),
                )
                .arg(
                    Arg::new("noise")
                        .long("noise")
                        .takes_value(true)
                        .default_value("8"),
                )
                .arg(
                    Arg::new("burst")
                        .long("burst")
                        .short('b')
                        .takes_value(true)
                        .multiple_occurrences(true),
                ),
        )
        .subcommand(Command::new("defaults").about("Print default detector settings as JSON"))
        .subcommand(Command::new("props").about("List tunable detector properties"))
        .get_matches();

    match matches.subcommand() {
        Some(("analyse", m)) => analyse(m),
        Some(("synth", m)) => synth(m),
        Some(("defaults", _)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&DetectorSettings::default())?
            );
            Ok(())
        }
        Some(("props", _)) => {
            for (name, prop) in DetectorSettings::default().props() {
                println!("{name}: {prop:?}");
            }
            Ok(())
        }
        _ => Err(anyhow!("Unknown command")),
    }
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| anyhow!("Missing argument `{name}`"))
}

fn analyse(matches: &ArgMatches) -> Result<()> {
    let input = arg(matches, "input")?;
    let still: usize = arg(matches, "still")?.parse()?;

    let mut settings: DetectorSettings = match matches.value_of("config") {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => Default::default(),
    };

    for s in matches.values_of("set").into_iter().flatten() {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected name=value, got `{s}`"))?;
        settings.set_prop(name, value)?;
    }

    debug!("Settings: {:?}", settings);

    let mut source = create_source(input)?;
    let (width, height) = source.dim();

    let mut monitor = MotionMonitor::new(width, height, settings)?;
    let mut frames = FrameBuffers::new(width, height);

    let mut output = matches
        .value_of("output")
        .map(csv::Writer::from_path)
        .transpose()?;

    let mut frame = 0;
    let mut missing = 0;
    let mut moving = 0;
    let mut was_still = false;

    while source.next_frame(&mut frames)? {
        let depth = frames.depth_frame()?;
        let body = frames.body_frame()?;

        if depth.is_none() || body.is_none() {
            missing += 1;
        }

        let tracked = body.map(|b| b.subjects()).unwrap_or_default();

        let reports = monitor.update(depth, body, &tracked)?;

        if reports.iter().any(|r| r.moved) {
            moving += 1;
        }

        if let Some(output) = &mut output {
            for r in &reports {
                output.serialize(Row {
                    frame,
                    subject: r.subject,
                    moved: r.moved,
                    area: r.area,
                    pixel_count: r.pixel_count,
                    average: r.average,
                    std_dev: r.std_dev,
                    still_frames: r.still_frames,
                })?;
            }
        }

        let is_still = monitor.all_still_for(still);

        if is_still && !was_still {
            info!("Frame {frame}: everyone held still for {still} frames");
        }

        was_still = is_still;
        frame += 1;
    }

    if let Some(mut output) = output {
        output.flush()?;
    }

    println!("{frame} frames, {moving} with motion, {missing} incomplete");

    Ok(())
}

fn synth(matches: &ArgMatches) -> Result<()> {
    let output = arg(matches, "output")?;
    let width: usize = arg(matches, "width")?.parse()?;
    let height: usize = arg(matches, "height")?.parse()?;

    let mut scene = SyntheticScene::new(width, height, arg(matches, "seed")?.parse()?)
        .with_frames(arg(matches, "frames")?.parse()?)
        .with_noise(arg(matches, "noise")?.parse()?);

    for burst in matches.values_of("burst").into_iter().flatten() {
        let (start, len) = burst
            .split_once(':')
            .ok_or_else(|| anyhow!("Expected start:len, got `{burst}`"))?;
        scene = scene.with_burst(start.parse()?, len.parse()?);
    }

    let out = BufWriter::new(File::create(output)?);
    let mut writer = RecordingWriter::new(out, width, height)?;
    let mut frames = FrameBuffers::new(width, height);

    let mut cnt = 0usize;

    while scene.next_frame(&mut frames)? {
        writer.write_buffers(&frames)?;
        cnt += 1;
    }

    writer.finish()?;

    info!("Wrote {cnt} frames to {output}");

    Ok(())
}
