use std::path::{Path, PathBuf};

use noodles_bam as bam;
use noodles_sam::{self as sam, alignment::record_buf::RecordBuf};
use thiserror::Error;
use tokio::{
    fs::File,
    io::{self, AsyncRead, AsyncWrite, AsyncWriteExt},
};

/// A stream of alignment records with the header it was opened with.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    fn header(&self) -> &sam::Header;

    /// Next record, `None` at the end of the stream.
    async fn read_record(&mut self) -> io::Result<Option<RecordBuf>>;
}

/// Destination for alignment records. The header is written when the sink is created.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    async fn write_record(&mut self, record: &RecordBuf) -> io::Result<()>;

    /// Flush and close the stream.
    async fn finish(&mut self) -> io::Result<()>;
}

struct BamSource<R> {
    bam: bam::r#async::io::Reader<R>,
    header: sam::Header,
}

impl<R> RecordSource for BamSource<R>
where
    R: AsyncRead + Unpin,
{
    fn header(&self) -> &sam::Header {
        &self.header
    }

    async fn read_record(&mut self) -> io::Result<Option<RecordBuf>> {
        let mut record = RecordBuf::default();
        match self.bam.read_record_buf(&self.header, &mut record).await? {
            0 => Ok(None),
            _n => Ok(Some(record)),
        }
    }
}

struct BamSink<W> {
    bam: bam::r#async::io::Writer<W>,
    header: sam::Header,
}

impl<W> RecordSink for BamSink<W>
where
    W: AsyncWrite + Unpin,
{
    async fn write_record(&mut self, record: &RecordBuf) -> io::Result<()> {
        self.bam.write_alignment_record(&self.header, record).await
    }

    async fn finish(&mut self) -> io::Result<()> {
        // shutting down the bgzf stream writes the EOF block
        self.bam.get_mut().shutdown().await
    }
}

/// Read the BAM header from `read`. Records are read lazily through the returned source.
pub async fn open_bam<R>(read: R) -> io::Result<impl RecordSource>
where
    R: AsyncRead + Unpin,
{
    let mut bam = bam::r#async::io::Reader::new(read);
    let header = bam.read_header().await?;

    Ok(BamSource { bam, header })
}

/// Start a BAM stream on `write` and write `header` to it immediately.
pub async fn create_bam_writer<W>(write: W, header: sam::Header) -> io::Result<impl RecordSink>
where
    W: AsyncWrite + Unpin,
{
    let mut bam = bam::r#async::io::Writer::new(write);
    bam.write_header(&header).await?;

    Ok(BamSink { bam, header })
}

pub async fn open_input(path: &Path) -> Result<File, BamIoError> {
    File::open(path)
        .await
        .map_err(|e| BamIoError::Open(path.to_owned(), e))
}

/// Output file, or stdout when no path is given.
pub async fn open_output(path: Option<&Path>) -> Result<Box<dyn AsyncWrite + Unpin>, BamIoError> {
    match path {
        Some(p) => {
            let file = File::create(p)
                .await
                .map_err(|e| BamIoError::Create(p.to_owned(), e))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

#[derive(Debug, Error)]
pub enum BamIoError {
    #[error("Could not open {}", .0.display())]
    Open(PathBuf, #[source] std::io::Error),
    #[error("Could not read BAM header from {}", .0.display())]
    Header(PathBuf, #[source] std::io::Error),
    #[error("Could not create output {}", .0.display())]
    Create(PathBuf, #[source] std::io::Error),
    #[error("Io error reading BAM")]
    IoError(#[from] std::io::Error),
}
