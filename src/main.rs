use anyhow::{Context, Result};
use clap::Parser;

use pianoroll_transcriber::postprocessing::midi::export_midi;
use pianoroll_transcriber::preprocessing::load_audio::convert_wav_to_raw;
use pianoroll_transcriber::{get_piano_roll, OnnxModel};

mod cli;

use cli::{Cli, Command, PrepareArgs, TranscribeArgs};

fn transcribe(args: &TranscribeArgs) -> Result<()> {
    let config = args.resolve_config()?;

    let model = OnnxModel::load(&args.model, args.device, args.threads)
        .with_context(|| format!("loading model {}", args.model.display()))?;

    let prediction = get_piano_roll(&args.input, &model, &config.transcribe)
        .with_context(|| format!("transcribing {}", args.input.display()))?;

    export_midi(prediction.view(), &args.output, &config.export)
        .with_context(|| format!("writing {}", args.output.display()))?;

    Ok(())
}

fn prepare(args: &PrepareArgs) -> Result<()> {
    convert_wav_to_raw(&args.input, &args.output, args.sample_rate)
        .with_context(|| format!("converting {}", args.input.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .init();

    match &cli.command {
        Command::Transcribe(args) => transcribe(args),
        Command::Prepare(args) => prepare(args),
    }
}
