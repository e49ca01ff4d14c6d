//! ARINC 424 fixed-width record access
//!
//! Column numbers follow the ARINC 424 convention: 1-based and inclusive.

/// Width of one ARINC 424 record, excluding the line terminator.
pub const RECORD_LENGTH: usize = 132;

const SECTION_CODE_COLUMN: usize = 5;
const AIRPORT_IDENT_COLUMNS: (usize, usize) = (7, 10);
const AIRPORT_SUBSECTION_COLUMN: usize = 13;
const LOCALIZER_IDENT_COLUMNS: (usize, usize) = (14, 17);
const CONTINUATION_COLUMN: usize = 22;

const SECTION_AIRPORT: u8 = b'P';
const SUBSECTION_LOCALIZER: u8 = b'I';

/// Borrowed view over one record line.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    raw: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }

    /// Value of a single column, if the record is long enough.
    pub fn column(&self, column: usize) -> Option<u8> {
        column
            .checked_sub(1)
            .and_then(|index| self.raw.get(index))
            .copied()
    }

    /// Columns `start..=end`, or `None` if the record is too short.
    pub fn columns(&self, start: usize, end: usize) -> Option<&'a [u8]> {
        if start == 0 || end < start {
            return None;
        }
        self.raw.get(start - 1..end)
    }

    pub fn section_code(&self) -> Option<u8> {
        self.column(SECTION_CODE_COLUMN)
    }

    /// Airport localizer / glide slope record (section `P`, subsection `I`).
    pub fn is_localizer(&self) -> bool {
        self.section_code() == Some(SECTION_AIRPORT)
            && self.column(AIRPORT_SUBSECTION_COLUMN) == Some(SUBSECTION_LOCALIZER)
    }

    /// Identity of a localizer record; two records with the same key
    /// describe the same localizer.
    pub fn localizer_key(&self) -> Option<LocalizerKey> {
        if !self.is_localizer() {
            return None;
        }

        let airport = self.columns(AIRPORT_IDENT_COLUMNS.0, AIRPORT_IDENT_COLUMNS.1)?;
        let localizer = self.columns(LOCALIZER_IDENT_COLUMNS.0, LOCALIZER_IDENT_COLUMNS.1)?;
        let continuation = self.column(CONTINUATION_COLUMN)?;

        Some(LocalizerKey {
            airport: airport.to_vec(),
            localizer: localizer.to_vec(),
            continuation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalizerKey {
    pub airport: Vec<u8>,
    pub localizer: Vec<u8>,
    pub continuation: u8,
}
