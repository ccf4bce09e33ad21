//! BibTeX entry data structures

/// BibTeX entry type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BibTeXEntryType {
    Article,
    Book,
    Booklet,
    InBook,
    InCollection,
    InProceedings,
    Manual,
    MastersThesis,
    Misc,
    PhdThesis,
    Proceedings,
    TechReport,
    Unpublished,
    Online,
    Software,
    Dataset,
    Unknown(String),
}

impl BibTeXEntryType {
    /// Parse an entry type from a string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "article" => Self::Article,
            "book" | "mvbook" => Self::Book,
            "booklet" => Self::Booklet,
            "inbook" | "bookinbook" => Self::InBook,
            "incollection" => Self::InCollection,
            "inproceedings" | "conference" => Self::InProceedings,
            "manual" => Self::Manual,
            "mastersthesis" => Self::MastersThesis,
            "misc" => Self::Misc,
            "phdthesis" | "thesis" => Self::PhdThesis,
            "proceedings" => Self::Proceedings,
            "techreport" | "report" => Self::TechReport,
            "unpublished" => Self::Unpublished,
            "online" | "electronic" | "www" => Self::Online,
            "software" => Self::Software,
            "dataset" => Self::Dataset,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The CSL item type this entry type converts to
    pub fn csl_type(&self) -> &'static str {
        match self {
            Self::Article => "article-journal",
            Self::Book | Self::Booklet | Self::Proceedings => "book",
            Self::InBook | Self::InCollection => "chapter",
            Self::InProceedings => "paper-conference",
            Self::Manual => "report",
            Self::MastersThesis | Self::PhdThesis => "thesis",
            Self::TechReport => "report",
            Self::Unpublished => "manuscript",
            Self::Online => "webpage",
            Self::Software => "software",
            Self::Dataset => "dataset",
            Self::Misc | Self::Unknown(_) => "document",
        }
    }
}

/// A single BibTeX field (key-value pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXField {
    pub key: String,
    pub value: String,
}

/// A parsed BibTeX entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXEntry {
    pub cite_key: String,
    pub entry_type: BibTeXEntryType,
    pub fields: Vec<BibTeXField>,
    /// 1-based line on which the entry starts
    pub line: u32,
}

impl BibTeXEntry {
    pub fn new(cite_key: String, entry_type: BibTeXEntryType) -> Self {
        Self {
            cite_key,
            entry_type,
            fields: Vec::new(),
            line: 0,
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push(BibTeXField {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Get a field value by key (case-insensitive)
    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key.eq_ignore_ascii_case(key))
            .map(|f| f.value.as_str())
    }

    /// All fields whose key starts with `prefix` (case-insensitive), in file order
    pub fn fields_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a BibTeXField> + 'a {
        let prefix = prefix.to_lowercase();
        self.fields
            .iter()
            .filter(move |f| f.key.to_lowercase().starts_with(&prefix))
    }

    pub fn title(&self) -> Option<&str> {
        self.get_field("title")
    }

    pub fn author(&self) -> Option<&str> {
        self.get_field("author")
    }

    pub fn year(&self) -> Option<&str> {
        self.get_field("year")
    }
}
