use crate::firestore::error::FirestoreResult;
use crate::firestore::model::FieldPath;

use super::record::DecodeOptions;

/// Per-read options for [`Orchestrator::resolve`](super::Orchestrator::resolve)
/// and [`Orchestrator::resolve_document`](super::Orchestrator::resolve_document).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Keep a change subscription open instead of reading once.
    pub listen: bool,
    /// Dotted field paths whose store-native timestamps are converted on decode.
    pub parse_dates: Vec<String>,
    /// Drop the remote snapshot instead of keeping it on each record.
    pub ignore_snapshot_field: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            listen: false,
            parse_dates: Vec::new(),
            ignore_snapshot_field: true,
        }
    }
}

impl ResolveOptions {
    pub fn live() -> Self {
        Self {
            listen: true,
            ..Self::default()
        }
    }

    pub fn with_parse_dates<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parse_dates = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn keep_snapshot(mut self) -> Self {
        self.ignore_snapshot_field = false;
        self
    }

    pub(crate) fn decode_options(
        &self,
        warn_reserved_fields: bool,
    ) -> FirestoreResult<DecodeOptions> {
        let parse_dates = self
            .parse_dates
            .iter()
            .map(|field| FieldPath::from_dot_separated(field))
            .collect::<FirestoreResult<Vec<_>>>()?;
        Ok(DecodeOptions {
            parse_dates,
            include_snapshot: !self.ignore_snapshot_field,
            warn_reserved_fields,
        })
    }
}

/// Options shared by local set, update and delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MutationOptions {
    /// Skip the optimistic cache update and only issue the remote write.
    pub ignore_local_mutation: bool,
}

/// Construction-time settings for [`SwrFirestore`](super::SwrFirestore).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwrSettings {
    /// Report reserved-field collisions in decoded documents. `None` reports
    /// them in debug builds only.
    pub warn_reserved_fields: Option<bool>,
}

impl SwrSettings {
    pub(crate) fn warns_on_reserved_fields(&self) -> bool {
        self.warn_reserved_fields.unwrap_or(cfg!(debug_assertions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_drop_snapshot() {
        let options = ResolveOptions::default();
        assert!(!options.listen);
        assert!(options.ignore_snapshot_field);
        assert!(!options.decode_options(false).unwrap().include_snapshot);
    }

    #[test]
    fn invalid_parse_dates_path_is_rejected() {
        let options = ResolveOptions::default().with_parse_dates(["user..createdAt"]);
        assert!(options.decode_options(false).is_err());
    }
}
