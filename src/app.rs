use std::path::PathBuf;

use clap::Parser;
use log::info;
use thiserror::Error;

use crate::{
    header::{HeaderError, ReadGroupFields},
    index::IndexMode,
    io::{create_bam_writer, open_bam, open_input, open_output, BamIoError, RecordSink, RecordSource},
    metrics::Metrics,
    transform::{StreamMode, StreamTransformer, TransformError},
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// BAM file with the correct read groups in the RG tag
    pub donor: PathBuf,

    /// BAM file to add read groups to. When this is the same file as the donor, read groups are
    /// derived from the read names
    pub recipient: PathBuf,

    /// Sample name, written to the SM field of every read group
    pub sample: String,

    /// The output bam file. rgtools writes to stdout when omitted
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// The transfer metrics file, if missing metrics will be written to stderr
    #[clap(short = 'm', long)]
    pub metrics: Option<PathBuf>,

    /// How donor read names are remembered. `hashed` keeps only a hash per read name and may
    /// assign the wrong read group when two names collide; `verified` keeps the full names
    #[clap(short = 'i', long, value_enum, default_value_t = IndexMode::Hashed)]
    pub index: IndexMode,

    /// Platform (PL) of the declared read groups
    #[clap(long, default_value = "Illumina")]
    pub platform: String,

    /// Library (LB) of the declared read groups
    #[clap(long, default_value = "Solexa")]
    pub library: String,

    /// Sequencing center (CN) of the declared read groups
    #[clap(long, default_value = "BI")]
    pub center: String,
}

impl Config {
    fn read_group_fields(&self) -> ReadGroupFields {
        ReadGroupFields {
            sample: self.sample.clone(),
            platform: self.platform.clone(),
            library: self.library.clone(),
            center: self.center.clone(),
        }
    }
}

pub struct App {
    config: Config,
    invocation: String,
}

impl App {
    /// `invocation` is the full command line, recorded in the @PG header line.
    pub fn new(config: Config, invocation: String) -> App {
        App { config, invocation }
    }

    /// Both inputs are opened before anything is read and the output is only opened once the
    /// donor has been read completely, so setup errors never leave partial output behind.
    pub async fn run(&self) -> Result<Metrics, RgToolsError> {
        let config = &self.config;
        if config.sample.is_empty() {
            return Err(HeaderError::EmptySample.into());
        }

        info!("Donor BAM with read groups in RG tag: {}", config.donor.display());
        info!("Recipient BAM without read groups:    {}", config.recipient.display());

        let mode = StreamMode::detect(&config.donor, &config.recipient);
        if mode == StreamMode::Same {
            info!("Donor and recipient are the same file, taking read groups from read names");
        }

        let donor_file = open_input(&config.donor).await?;
        let recipient_file = open_input(&config.recipient).await?;
        let mut donor = open_bam(donor_file)
            .await
            .map_err(|e| BamIoError::Header(config.donor.clone(), e))?;
        let mut recipient = open_bam(recipient_file)
            .await
            .map_err(|e| BamIoError::Header(config.recipient.clone(), e))?;

        let mut transformer = StreamTransformer::new(
            mode,
            config.index.build(),
            config.read_group_fields(),
            self.invocation.clone(),
        );

        transformer.index_donor(&mut donor).await?;
        drop(donor);

        let header = transformer.build_header(recipient.header())?;
        let out = open_output(config.output.as_deref()).await?;
        let mut out = create_bam_writer(out, header).await?;

        transformer.emit(&mut recipient, &mut out).await?;
        out.finish().await?;

        let metrics = transformer.into_metrics();

        // print/write the metrics (sync)
        if let Some(path) = &config.metrics {
            use std::io::Write;
            let mut mout = std::fs::File::create(path)?;
            write!(mout, "{}", metrics)?;
        } else {
            eprint!("{}", metrics);
        }

        Ok(metrics)
    }
}

#[derive(Debug, Error)]
pub enum RgToolsError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    BamIo(#[from] BamIoError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}
