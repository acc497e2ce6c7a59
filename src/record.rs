use bstr::ByteSlice;
use noodles_sam::alignment::record::data::field::Tag;
use noodles_sam::alignment::record_buf::{data::field::Value, RecordBuf};

/// Read name and `RG` tag access on records.
pub trait ReadGroupExt {
    /// Read name, empty when the record has none.
    fn read_name(&self) -> &[u8];

    /// Value of the `RG:Z` tag. Missing, empty and non-string values are all `None`.
    fn read_group(&self) -> Option<&str>;

    fn set_read_group(&mut self, value: &str);

    fn clear_read_group(&mut self);

    /// Short description for diagnostics: name, flags and alignment start.
    fn brief(&self) -> String;
}

impl ReadGroupExt for RecordBuf {
    fn read_name(&self) -> &[u8] {
        self.name().map(<_ as AsRef<[u8]>>::as_ref).unwrap_or_default()
    }

    fn read_group(&self) -> Option<&str> {
        match self.data().get(&Tag::READ_GROUP) {
            Some(Value::String(s)) => s.to_str().ok().filter(|s| !s.is_empty()),
            _ => None,
        }
    }

    fn set_read_group(&mut self, value: &str) {
        self.data_mut().insert(Tag::READ_GROUP, Value::from(value));
    }

    fn clear_read_group(&mut self) {
        self.data_mut().remove(&Tag::READ_GROUP);
    }

    fn brief(&self) -> String {
        let reference = self
            .reference_sequence_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "*".to_string());
        let start = self
            .alignment_start()
            .map(|p| usize::from(p).to_string())
            .unwrap_or_else(|| "*".to_string());

        format!(
            "{} flag:{} pos:{}:{}",
            self.read_name().as_bstr(),
            u16::from(self.flags()),
            reference,
            start
        )
    }
}
