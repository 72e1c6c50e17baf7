use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use kwtag_types::{Language, TAG_COUNT, Tag, UnsupportedLanguage};
use tracing::{debug, info, warn};

/// Location of the term list for one `(language, tag)` pair.
pub fn term_list_path(dir: &Path, language: Language, tag: Tag) -> PathBuf {
    dir.join(format!("{}_{}.txt", language.code(), tag.file_id()))
}

/// Trim and lowercase a raw dictionary line. Blank lines and anything spanning
/// more than one line yield `None`.
pub fn normalize_term(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() || trimmed.contains(['\n', '\r']) {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Terms of one language grouped by tag, plus the derived `term -> tag` index.
#[derive(Debug, Clone)]
pub struct Dictionary {
    language: Language,
    terms: [HashSet<String>; TAG_COUNT],
    reverse: Arc<HashMap<String, Tag>>,
}

impl Dictionary {
    pub fn empty(language: Language) -> Self {
        Self::from_terms(language, array_init::array_init(|_| HashSet::new()))
    }

    /// Build a dictionary from per-tag term sets, indexed by [`Tag::index`].
    ///
    /// A term listed under several tags is kept only under the first one in
    /// [`Tag::ALL`] order.
    pub fn from_terms(language: Language, mut terms: [HashSet<String>; TAG_COUNT]) -> Self {
        let mut reverse: HashMap<String, Tag> = HashMap::new();
        for tag in Tag::ALL {
            let set = &mut terms[tag.index()];
            set.retain(|term| match reverse.get(term) {
                Some(kept) => {
                    warn!("{language}: {term:?} is listed under {kept} and {tag}; keeping {kept}");
                    false
                }
                None => true,
            });
            for term in set.iter() {
                reverse.insert(term.clone(), tag);
            }
        }
        Self {
            language,
            terms,
            reverse: Arc::new(reverse),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn terms(&self, tag: Tag) -> &HashSet<String> {
        &self.terms[tag.index()]
    }

    pub fn reverse_index(&self) -> &HashMap<String, Tag> {
        &self.reverse
    }

    /// Case-insensitive lookup of a single term.
    pub fn tag_of(&self, term: &str) -> Option<Tag> {
        self.reverse.get(&term.to_lowercase()).copied()
    }

    /// Iterate `(term, tag)` pairs in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Tag)> {
        self.reverse.iter().map(|(term, tag)| (term.as_str(), *tag))
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}

/// Lazily loads and caches one [`Dictionary`] per language.
///
/// The first caller for a language builds the dictionary while holding that
/// key's entry, so concurrent first requests never build it twice. Later calls
/// return the cached value and never touch the file system again.
pub struct DictionaryStore {
    dir: PathBuf,
    cache: DashMap<Language, Arc<Dictionary>>,
}

impl DictionaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, language: Language) -> Arc<Dictionary> {
        if let Some(hit) = self.cache.get(&language) {
            return Arc::clone(hit.value());
        }
        let entry = self
            .cache
            .entry(language)
            .or_insert_with(|| Arc::new(load_dictionary(&self.dir, language)));
        Arc::clone(entry.value())
    }

    /// Like [`DictionaryStore::load`] for a raw language code.
    pub fn load_code(&self, code: &str) -> Result<Arc<Dictionary>, UnsupportedLanguage> {
        let language: Language = code.parse()?;
        Ok(self.load(language))
    }

    pub fn reverse_index(&self, language: Language) -> Arc<HashMap<String, Tag>> {
        Arc::clone(&self.load(language).reverse)
    }

    pub fn is_loaded(&self, language: Language) -> bool {
        self.cache.contains_key(&language)
    }
}

fn load_dictionary(dir: &Path, language: Language) -> Dictionary {
    info!("loading {language} dictionaries from {}", dir.display());
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot list {}: {err}; {language} dictionary is empty", dir.display());
            return Dictionary::empty(language);
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let prefix = format!("{}_", language.code());
    let mut terms: [HashSet<String>; TAG_COUNT] = array_init::array_init(|_| HashSet::new());
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(file_id) = stem.strip_prefix(&prefix) else {
            continue;
        };
        let Some(tag) = Tag::from_file_id(file_id) else {
            warn!("skipping {}: {file_id:?} is not a known tag", path.display());
            continue;
        };
        match read_term_list(&path) {
            Ok(list) => {
                info!("loaded {} terms from {}", list.len(), path.display());
                terms[tag.index()].extend(list);
            }
            Err(err) => warn!("skipping unreadable {}: {err}", path.display()),
        }
    }

    let dictionary = Dictionary::from_terms(language, terms);
    debug!("{language} dictionary holds {} terms", dictionary.len());
    dictionary
}

pub(crate) fn read_term_list(path: &Path) -> io::Result<HashSet<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents.lines().filter_map(normalize_term).collect())
}
