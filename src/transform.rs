//! Two pass read group transfer.
//!
//! The donor BAM is read completely first to collect its read groups, because the output header
//! has to declare all of them before the first record is written. The recipient BAM is then
//! streamed to the output with the read group of each read attached.

use std::borrow::Cow;
use std::path::Path;

use bstr::ByteSlice;
use log::{info, warn};
use noodles_sam::{self as sam, alignment::record_buf::RecordBuf};
use thiserror::Error;

use crate::{
    catalog::{CatalogError, ReadGroupCatalog},
    header::{header_text, parse_header, rewrite, HeaderError, ReadGroupFields},
    index::IdentityIndex,
    io::{RecordSink, RecordSource},
    metrics::{Metrics, Status},
    progress::ProgressLogger,
    qname::derive_read_group,
    record::ReadGroupExt,
};

/// Donor reads without an `RG` tag that are reported individually.
pub const MISSING_READ_GROUP_WARNINGS: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamMode {
    /// Donor and recipient are different files, read groups are matched by read name.
    Distinct,
    /// Donor and recipient are the same file, read groups come from the read names.
    Same,
}

impl StreamMode {
    pub fn detect(donor: &Path, recipient: &Path) -> StreamMode {
        let same = match (donor.canonicalize(), recipient.canonicalize()) {
            (Ok(d), Ok(r)) => d == r,
            _ => donor == recipient,
        };

        if same {
            StreamMode::Same
        } else {
            StreamMode::Distinct
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    IndexingDonor,
    HeaderBuilt,
    Emitting,
    Done,
}

pub struct StreamTransformer {
    mode: StreamMode,
    catalog: ReadGroupCatalog,
    index: Box<dyn IdentityIndex>,
    fields: ReadGroupFields,
    invocation: String,
    state: State,
    metrics: Metrics,
}

impl StreamTransformer {
    pub fn new(
        mode: StreamMode,
        index: Box<dyn IdentityIndex>,
        fields: ReadGroupFields,
        invocation: String,
    ) -> StreamTransformer {
        StreamTransformer {
            mode,
            catalog: ReadGroupCatalog::new(),
            index,
            fields,
            invocation,
            state: State::Idle,
            metrics: Metrics::default(),
        }
    }

    /// First pass: collect the read groups of the donor and, for distinct files, which read
    /// group each read name belongs to.
    pub async fn index_donor<S>(&mut self, donor: &mut S) -> Result<(), TransformError>
    where
        S: RecordSource,
    {
        self.advance(State::Idle, State::IndexingDonor)?;

        let mut progress = ProgressLogger::new("Read donor");
        while let Some(record) = donor.read_record().await? {
            self.metrics.count(Status::DonorRecord);
            progress.record(|| record.brief());

            let name = record.read_name();
            let tag = record.read_group();
            if tag.is_none() {
                self.missing_read_group(name);
            }

            match self.mode {
                StreamMode::Distinct => {
                    let value = match tag {
                        Some(rg) => Cow::Borrowed(rg),
                        None => Cow::Owned(derive_read_group(name)),
                    };
                    if value.is_empty() {
                        continue;
                    }
                    let id = self.catalog.intern(&value)?;
                    self.index.record(name, id);
                    self.metrics.count(Status::DonorIndexed);
                }
                StreamMode::Same => {
                    // the second pass writes the name derived value, the tag only survives
                    // when the name has none
                    let derived = derive_read_group(name);
                    if !derived.is_empty() {
                        self.catalog.intern(&derived)?;
                    } else if let Some(rg) = tag {
                        self.catalog.intern(rg)?;
                    }
                }
            }
        }
        progress.finish();

        self.metrics.set_read_groups(self.catalog.len());
        info!(
            "Found {} read groups in {} donor records ({} without RG tag)",
            self.catalog.len(),
            self.metrics.donor_records(),
            self.metrics.donor_missing_read_group()
        );

        Ok(())
    }

    /// Header for the output: the recipient header with its read groups replaced by the donor's.
    pub fn build_header(&mut self, recipient: &sam::Header) -> Result<sam::Header, TransformError> {
        self.advance(State::IndexingDonor, State::HeaderBuilt)?;

        let original = header_text(recipient).map_err(HeaderError::from)?;
        let text = rewrite(
            &original,
            self.catalog.groups(),
            &self.fields,
            &self.invocation,
        )?;

        Ok(parse_header(&text)?)
    }

    /// Second pass: tag and write every recipient record. Reads without a read group are still
    /// written.
    pub async fn emit<S, K>(&mut self, recipient: &mut S, out: &mut K) -> Result<(), TransformError>
    where
        S: RecordSource,
        K: RecordSink,
    {
        self.advance(State::HeaderBuilt, State::Emitting)?;

        let mut progress = ProgressLogger::new("Wrote");
        while let Some(mut record) = recipient.read_record().await? {
            self.metrics.count(Status::RecipientRecord);

            let tagged = match self.resolve(&record)? {
                Some(value) => {
                    record.set_read_group(&value);
                    true
                }
                None => false,
            };

            if tagged {
                self.metrics.count(Status::RecipientTagged);
            } else {
                self.metrics.count(Status::RecipientUntagged);
                if self.mode == StreamMode::Distinct {
                    warn!("No read group found for read {}", record.read_name().as_bstr());
                    record.clear_read_group();
                }
            }

            out.write_record(&record).await?;
            progress.record(|| record.brief());
        }
        progress.finish();

        self.state = State::Done;
        info!(
            "Tagged {} of {} recipient records",
            self.metrics.recipient_tagged(),
            self.metrics.recipient_records()
        );

        Ok(())
    }

    fn resolve(&self, record: &RecordBuf) -> Result<Option<Cow<'_, str>>, CatalogError> {
        match self.mode {
            StreamMode::Distinct => match self.index.lookup(record.read_name()) {
                Some(id) => Ok(Some(Cow::Borrowed(self.catalog.resolve(id)?))),
                None => Ok(None),
            },
            StreamMode::Same => {
                let value = derive_read_group(record.read_name());
                Ok((!value.is_empty()).then_some(Cow::Owned(value)))
            }
        }
    }

    fn missing_read_group(&mut self, name: &[u8]) {
        self.metrics.count(Status::DonorMissingReadGroup);
        let n = self.metrics.donor_missing_read_group();
        if n <= MISSING_READ_GROUP_WARNINGS {
            warn!(
                "No read group in donor for read {}, using {:?} from read name",
                name.as_bstr(),
                derive_read_group(name)
            );
            if n == MISSING_READ_GROUP_WARNINGS {
                warn!("Not reporting further donor reads without read group");
            }
        }
    }

    fn advance(&mut self, from: State, to: State) -> Result<(), TransformError> {
        if self.state != from {
            return Err(TransformError::OutOfOrder {
                expected: from,
                found: self.state,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn catalog(&self) -> &ReadGroupCatalog {
        &self.catalog
    }

    pub fn into_metrics(self) -> Metrics {
        self.metrics
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Error reading or writing BAM records")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Read group transfer is {found:?}, expected {expected:?}")]
    OutOfOrder { expected: State, found: State },
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::catalog::MAX_READ_GROUPS;
    use crate::index::IndexMode;
    use crate::io::tests::{record, HEADER};
    use tokio::io;

    /// Collects log lines emitted on the current thread.
    mod capture {
        use std::cell::RefCell;
        use std::sync::Once;

        use log::{Level, LevelFilter, Log, Metadata, Record};

        thread_local! {
            static LINES: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
        }

        struct Capture;

        impl Log for Capture {
            fn enabled(&self, _: &Metadata) -> bool {
                true
            }

            fn log(&self, record: &Record) {
                let line = (record.level(), record.args().to_string());
                LINES.with(|l| l.borrow_mut().push(line));
            }

            fn flush(&self) {}
        }

        static CAPTURE: Capture = Capture;
        static INIT: Once = Once::new();

        pub fn install() {
            INIT.call_once(|| {
                if log::set_logger(&CAPTURE).is_ok() {
                    log::set_max_level(LevelFilter::Trace);
                }
            });
            LINES.with(|l| l.borrow_mut().clear());
        }

        pub fn warnings() -> Vec<String> {
            LINES.with(|l| {
                l.borrow()
                    .iter()
                    .filter(|(level, _)| *level == Level::Warn)
                    .map(|(_, line)| line.clone())
                    .collect()
            })
        }
    }

    struct VecSource {
        header: sam::Header,
        records: VecDeque<RecordBuf>,
    }

    impl VecSource {
        fn new(records: Vec<RecordBuf>) -> VecSource {
            VecSource { header: HEADER.parse().unwrap(), records: records.into() }
        }
    }

    impl RecordSource for VecSource {
        fn header(&self) -> &sam::Header {
            &self.header
        }

        async fn read_record(&mut self) -> io::Result<Option<RecordBuf>> {
            Ok(self.records.pop_front())
        }
    }

    #[derive(Default)]
    struct VecSink(Vec<RecordBuf>);

    impl RecordSink for VecSink {
        async fn write_record(&mut self, record: &RecordBuf) -> io::Result<()> {
            self.0.push(record.clone());
            Ok(())
        }

        async fn finish(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn transformer(mode: StreamMode, index: IndexMode) -> StreamTransformer {
        StreamTransformer::new(
            mode,
            index.build(),
            ReadGroupFields::new("S1"),
            "rgtools donor.bam recipient.bam S1".to_string(),
        )
    }

    async fn run(
        mode: StreamMode,
        index: IndexMode,
        donor: Vec<RecordBuf>,
        recipient: Vec<RecordBuf>,
    ) -> (sam::Header, Vec<RecordBuf>, Metrics) {
        let mut t = transformer(mode, index);
        let mut donor = VecSource::new(donor);
        let mut recipient = VecSource::new(recipient);
        let mut out = VecSink::default();

        t.index_donor(&mut donor).await.unwrap();
        let header = t.build_header(recipient.header()).unwrap();
        t.emit(&mut recipient, &mut out).await.unwrap();
        assert_eq!(t.state(), State::Done);

        (header, out.0, t.into_metrics())
    }

    fn read_group_ids(header: &sam::Header) -> Vec<String> {
        header.read_groups().keys().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn tag_from_donor() {
        for index in [IndexMode::Hashed, IndexMode::Verified] {
            let (header, out, metrics) = run(
                StreamMode::Distinct,
                index,
                vec![record("A", Some("flowcell1:lane2:x"))],
                vec![record("A", None)],
            )
            .await;

            assert_eq!(read_group_ids(&header), vec!["flowcell1:lane2:x"]);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].read_group(), Some("flowcell1:lane2:x"));
            assert_eq!(metrics.recipient_tagged(), 1);
            assert_eq!(metrics.donor_missing_read_group(), 0);
        }
    }

    #[tokio::test]
    async fn tag_from_donor_read_name() {
        let (header, out, metrics) = run(
            StreamMode::Distinct,
            IndexMode::Hashed,
            vec![record("fc7:3:1101:1000", None)],
            vec![record("fc7:3:1101:1000", None)],
        )
        .await;

        assert_eq!(read_group_ids(&header), vec!["fc7_3"]);
        assert_eq!(out[0].read_group(), Some("fc7_3"));
        assert_eq!(metrics.donor_missing_read_group(), 1);
        assert_eq!(metrics.donor_indexed(), 1);
    }

    #[tokio::test]
    async fn same_file_uses_read_names() {
        let records = vec![
            record("fcA:1:1101:1:1", None),
            record("fcA:2:1101:1:1", Some("custom")),
            record("fcB:1:1101:1:1", None),
        ];
        let (header, out, metrics) =
            run(StreamMode::Same, IndexMode::Hashed, records.clone(), records).await;

        let tags: Vec<_> = out.iter().map(|r| r.read_group()).collect();
        assert_eq!(tags, vec![Some("fcA_1"), Some("fcA_2"), Some("fcB_1")]);
        for r in &out {
            assert_eq!(
                r.read_group().map(str::to_string),
                Some(derive_read_group(r.read_name()))
            );
        }

        let ids = read_group_ids(&header);
        for tag in tags.into_iter().flatten() {
            assert!(ids.iter().any(|id| id == tag), "{} not declared", tag);
        }
        // the RG tag is replaced by the name derived value, so it is not declared
        assert_eq!(ids, vec!["fcA_1", "fcA_2", "fcB_1"]);
        assert_eq!(metrics.donor_indexed(), 0);
    }

    #[tokio::test]
    async fn same_file_without_delimiter_keeps_tag() {
        let records = vec![record("read1", Some("rg1")), record("read2", None)];
        let (header, out, metrics) =
            run(StreamMode::Same, IndexMode::Hashed, records.clone(), records).await;

        assert_eq!(read_group_ids(&header), vec!["rg1"]);
        assert_eq!(out[0].read_group(), Some("rg1"));
        assert_eq!(out[1].read_group(), None);
        assert_eq!(metrics.recipient_untagged(), 2);
    }

    #[tokio::test]
    async fn unknown_read_is_written_untagged() {
        capture::install();
        let (header, out, metrics) = run(
            StreamMode::Distinct,
            IndexMode::Verified,
            vec![record("A", Some("rg1"))],
            vec![record("C", Some("old")), record("A", None)],
        )
        .await;

        assert_eq!(read_group_ids(&header), vec!["rg1"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].read_name(), b"C");
        assert_eq!(out[0].read_group(), None);
        assert_eq!(out[1].read_group(), Some("rg1"));
        assert_eq!(metrics.recipient_untagged(), 1);
        assert_eq!(metrics.recipient_tagged(), 1);
        assert_eq!(capture::warnings(), vec!["No read group found for read C"]);
    }

    #[tokio::test]
    async fn mates_share_read_group() {
        let (header, out, _) = run(
            StreamMode::Distinct,
            IndexMode::Hashed,
            vec![
                record("p1", Some("rg1")),
                record("p2", Some("rg2")),
                record("p1", Some("rg1")),
                record("p2", Some("rg2")),
            ],
            vec![
                record("p2", None),
                record("p1", None),
                record("p2", None),
                record("p1", None),
            ],
        )
        .await;

        assert_eq!(read_group_ids(&header), vec!["rg1", "rg2"]);
        let tags: Vec<_> = out.iter().map(|r| r.read_group()).collect();
        assert_eq!(tags, vec![Some("rg2"), Some("rg1"), Some("rg2"), Some("rg1")]);
    }

    #[tokio::test]
    async fn header_keeps_other_lines() {
        let (header, _, _) = run(
            StreamMode::Distinct,
            IndexMode::Hashed,
            vec![record("A", Some("rg1"))],
            vec![record("A", None)],
        )
        .await;

        assert_eq!(header.reference_sequences().len(), 1);
        assert!(!header.read_groups().contains_key(&b"old"[..]));
        let programs = header.programs();
        assert!(programs.as_ref().contains_key(&b"bwa"[..]));
        assert!(programs.as_ref().contains_key(&b"rgtools"[..]));
    }

    #[tokio::test]
    async fn too_many_read_groups() {
        let donor = (0..=MAX_READ_GROUPS)
            .map(|i| record(&format!("r{}", i), Some(format!("rg{}", i).as_str())))
            .collect();
        let mut t = transformer(StreamMode::Distinct, IndexMode::Hashed);
        let err = t.index_donor(&mut VecSource::new(donor)).await.unwrap_err();
        assert!(matches!(err, TransformError::Catalog(CatalogError::Exhausted(_))));
    }

    #[tokio::test]
    async fn empty_sample() {
        let mut t = StreamTransformer::new(
            StreamMode::Distinct,
            IndexMode::Hashed.build(),
            ReadGroupFields::new(""),
            "rgtools".to_string(),
        );
        let mut donor = VecSource::new(vec![record("A", Some("rg1"))]);
        t.index_donor(&mut donor).await.unwrap();
        let err = t.build_header(donor.header()).unwrap_err();
        assert!(matches!(err, TransformError::Header(HeaderError::EmptySample)));
    }

    #[tokio::test]
    async fn phases_in_order() {
        let mut t = transformer(StreamMode::Distinct, IndexMode::Hashed);
        let mut recipient = VecSource::new(vec![record("A", None)]);
        let mut out = VecSink::default();

        let err = t.emit(&mut recipient, &mut out).await.unwrap_err();
        assert!(matches!(
            err,
            TransformError::OutOfOrder { expected: State::HeaderBuilt, found: State::Idle }
        ));
        assert!(t.build_header(recipient.header()).is_err());
        assert!(out.0.is_empty());

        t.index_donor(&mut VecSource::new(Vec::new())).await.unwrap();
        assert!(t.index_donor(&mut VecSource::new(Vec::new())).await.is_err());
        assert!(t.catalog().is_empty());
    }

    #[test]
    fn detect_mode() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bam");
        let b = dir.path().join("b.bam");
        std::fs::write(&a, b"").unwrap();
        std::fs::write(&b, b"").unwrap();

        assert_eq!(StreamMode::detect(&a, &b), StreamMode::Distinct);
        assert_eq!(StreamMode::detect(&a, &a), StreamMode::Same);
        let dotted = dir.path().join(".").join("a.bam");
        assert_eq!(StreamMode::detect(&a, &dotted), StreamMode::Same);
        // paths that do not exist are compared as given
        assert_eq!(
            StreamMode::detect(Path::new("x.bam"), Path::new("x.bam")),
            StreamMode::Same
        );
    }
}
