use clap::Parser;
use mpeg2ts_scte35::{scte35, Stream};
use std::fs::File;
use std::io::{self, BufReader};

/// Prints the SCTE-35 cues found in an MPEG Transport Stream as JSON
#[derive(Parser)]
struct Opt {
    /// Transport stream file to read, or `-` for standard input
    #[clap(default_value = "-")]
    input: String,

    /// Only report cues belonging to this program number
    #[clap(long)]
    program: Option<u16>,

    /// Copy the input to standard output, reporting cues on standard error
    #[clap(long, conflicts_with = "show")]
    proxy: bool,

    /// List the programs and streams announced by the first program map tables, then exit
    #[clap(long)]
    show: bool,

    /// Also report splice_null() cues
    #[clap(long, default_value_t = false)]
    show_null: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let opt = Opt::parse();

    let input: Box<dyn io::Read> = if opt.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(&opt.input)?)
    };
    let mut stream = Stream::new(BufReader::new(input), opt.show_null);

    if opt.show {
        stream.show()?;
    } else if opt.proxy {
        stream.decode_proxy(scte35::show_cue_stderr)?;
    } else if let Some(program) = opt.program {
        stream.decode_program(program, scte35::show_cue)?;
    } else {
        stream.decode(scte35::show_cue)?;
    }
    Ok(())
}
