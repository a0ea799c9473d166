//! Case-sensitivity matching policy.
//!
//! Every case-handling decision in the workspace is answered by one value:
//! which of the four filesystem × database sensitivity combinations is in
//! effect. Scattering `if insensitive_fs || insensitive_db` checks around the
//! engine is how wrong-case rows and orphan records happen, so the questions
//! are centralized here and the call sites stay boolean-free.

/// The filesystem × database case-sensitivity combination.
///
/// The filesystem side is an *assumption* supplied by configuration (there is
/// no reliable way to probe it), the database side must match the collation
/// the table was actually created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingMode {
    /// Case-sensitive filesystem, case-sensitive database.
    SensitiveBoth,
    /// Case-sensitive filesystem, case-insensitive database.
    InsensitiveDb,
    /// Case-insensitive filesystem, case-sensitive database.
    InsensitiveFs,
    /// Case-insensitive filesystem, case-insensitive database.
    InsensitiveBoth,
}

impl MatchingMode {
    /// Derive the mode from the two configuration flags.
    pub fn new(case_insensitive_filesystem: bool, case_insensitive_database: bool) -> Self {
        match (case_insensitive_filesystem, case_insensitive_database) {
            (false, false) => Self::SensitiveBoth,
            (false, true) => Self::InsensitiveDb,
            (true, false) => Self::InsensitiveFs,
            (true, true) => Self::InsensitiveBoth,
        }
    }

    /// Whether the filesystem is assumed case-insensitive.
    pub fn insensitive_fs(self) -> bool {
        matches!(self, Self::InsensitiveFs | Self::InsensitiveBoth)
    }

    /// Whether the database collation is case-insensitive.
    pub fn insensitive_db(self) -> bool {
        matches!(self, Self::InsensitiveDb | Self::InsensitiveBoth)
    }

    /// Whether `dir`/`filename` comparisons match case-insensitively.
    ///
    /// True as soon as *either* side is case-insensitive: cache keys get
    /// lowercased and name diffs are taken on lowercased keys.
    pub fn insensitive_matching(self) -> bool {
        self != Self::SensitiveBoth
    }

    /// Whether SQL comparisons need explicit `LOWER(column)` wrapping.
    ///
    /// Only the insensitive-filesystem/sensitive-database combination needs
    /// it: the database would otherwise distinguish casings the filesystem
    /// cannot.
    pub fn need_sql_lowering(self) -> bool {
        self == Self::InsensitiveFs
    }

    /// Whether rows fetched from the database may contain case-colliding
    /// duplicates that must be resolved before caching.
    ///
    /// A case-sensitive database under a case-insensitive filesystem happily
    /// stores `("d", "bb")` next to `("D", "BB")` even though both describe
    /// the same on-disk file.
    pub fn needs_record_dedup(self) -> bool {
        self == Self::InsensitiveFs
    }

    /// Whether a raw directory listing may contain entries the database
    /// cannot tell apart, so the listing itself must be deduplicated.
    ///
    /// Only a case-sensitive filesystem can produce `AA` and `aa` side by
    /// side; only a case-insensitive database chokes on indexing both.
    pub fn dedup_listing(self) -> bool {
        self == Self::InsensitiveDb
    }

    /// SQLite only: whether the connection-wide `case_sensitive_like` pragma
    /// must be ON. LIKE follows the pragma rather than column collation, so
    /// it is ON exactly when both sides are case-sensitive.
    pub fn sqlite_case_sensitive_like(self) -> bool {
        self == Self::SensitiveBoth
    }

    /// The cache/diff key for a `dir` or `filename` value.
    pub fn key(self, value: &str) -> String {
        if self.insensitive_matching() { value.to_lowercase() } else { value.to_owned() }
    }
}
