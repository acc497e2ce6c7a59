use std::fmt;

/// Read group transfer metrics.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Metrics {
    donor_records: usize,
    donor_missing_read_group: usize,
    donor_indexed: usize,
    read_groups: usize,
    recipient_records: usize,
    recipient_tagged: usize,
    recipient_untagged: usize,
}

pub enum Status {
    DonorRecord,
    /// Donor record without an `RG` tag, read group taken from the read name
    DonorMissingReadGroup,
    DonorIndexed,
    RecipientRecord,
    RecipientTagged,
    RecipientUntagged,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DONOR_RECORDS\tDONOR_MISSING_READ_GROUP\tDONOR_INDEXED\tREAD_GROUPS\tRECIPIENT_RECORDS\tRECIPIENT_TAGGED\tRECIPIENT_UNTAGGED\tPERCENT_TAGGED")?;
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}",
            self.donor_records,
            self.donor_missing_read_group,
            self.donor_indexed,
            self.read_groups,
            self.recipient_records,
            self.recipient_tagged,
            self.recipient_untagged,
            self.percent_tagged()
        )
    }
}

impl Metrics {
    pub fn percent_tagged(&self) -> f64 {
        if self.recipient_records == 0 {
            0.0
        } else {
            100.0 * self.recipient_tagged as f64 / self.recipient_records as f64
        }
    }

    pub fn count(&mut self, status: Status) {
        self.count_many(status, 1);
    }

    pub fn count_many(&mut self, status: Status, count: usize) {
        match status {
            Status::DonorRecord => self.donor_records += count,
            Status::DonorMissingReadGroup => self.donor_missing_read_group += count,
            Status::DonorIndexed => self.donor_indexed += count,
            Status::RecipientRecord => self.recipient_records += count,
            Status::RecipientTagged => self.recipient_tagged += count,
            Status::RecipientUntagged => self.recipient_untagged += count,
        }
    }

    pub fn set_read_groups(&mut self, n: usize) {
        self.read_groups = n;
    }

    pub fn donor_records(&self) -> usize {
        self.donor_records
    }

    pub fn donor_missing_read_group(&self) -> usize {
        self.donor_missing_read_group
    }

    pub fn donor_indexed(&self) -> usize {
        self.donor_indexed
    }

    pub fn read_groups(&self) -> usize {
        self.read_groups
    }

    pub fn recipient_records(&self) -> usize {
        self.recipient_records
    }

    pub fn recipient_tagged(&self) -> usize {
        self.recipient_tagged
    }

    pub fn recipient_untagged(&self) -> usize {
        self.recipient_untagged
    }
}
