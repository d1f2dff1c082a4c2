//! Locale and namespace detection from locale file paths.

use std::collections::HashSet;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::LazyLock;

/// ISO 639-1 codes, plus a few three-letter codes seen in locale directories.
const LANGUAGE_CODE_TABLE: &str = "
    aa ab ae af ak am an ar as av ay az ba be bg bh bi bm bn bo br bs ca ce ch co cr cs cu cv
    cy da de dv dz ee el en eo es et eu fa ff fi fj fo fr fy ga gd gl gn gu gv ha he hi ho hr
    ht hu hy hz ia id ie ig ii ik io is it iu ja jv ka kg ki kj kk kl km kn ko kr ks ku kv kw
    ky la lb lg li ln lo lt lu lv mg mh mi mk ml mn mr ms mt my na nb nd ne ng nl nn no nr nv
    ny oc oj om or os pa pi pl ps pt qu rm rn ro ru rw sa sc sd se sg si sk sl sm sn so sq sr
    ss st su sv sw ta te tg th ti tk tl tn to tr ts tt tw ty ug uk ur uz ve vi vo wa wo xh yi
    yo za zh zu
    ast fil haw kok syr yue
";

static LANGUAGE_CODES: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| LANGUAGE_CODE_TABLE.split_whitespace().collect());

/// Whether `text` is a locale identifier such as `en`, `fr-FR`, `pt_BR` or `zh-Hans-CN`.
///
/// The language subtag must be a known code; further subtags must be 2 to 4
/// ASCII alphanumerics.
#[must_use]
pub fn is_locale_code(text: &str) -> bool {
    let mut subtags = text.split(['-', '_']);
    let Some(language) = subtags.next() else {
        return false;
    };
    if !LANGUAGE_CODES.contains(language.to_ascii_lowercase().as_str()) {
        return false;
    }
    subtags.all(|subtag| {
        (2..=4).contains(&subtag.len()) && subtag.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Locale and namespace a file contributes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileLayout {
    pub(crate) locale: String,
    pub(crate) namespace: Option<String>,
}

/// Detects the layout of a file from its path relative to the locale directory.
///
/// # Examples
/// - `en.json` -> locale `en`
/// - `en/common.json` -> locale `en`, namespace `common`
/// - `common/en.json` -> locale `en`, namespace `common`
/// - `common/errors.json` -> `None`
pub(crate) fn detect_layout(relative: &Path) -> Option<FileLayout> {
    let stem = relative.file_stem()?.to_str()?;
    let parent = relative.parent().and_then(Path::file_name).and_then(|name| name.to_str());

    if is_locale_code(stem) {
        return Some(FileLayout {
            locale: stem.to_string(),
            namespace: parent.filter(|name| !is_locale_code(name)).map(ToString::to_string),
        });
    }

    let parent = parent?;
    is_locale_code(parent)
        .then(|| FileLayout { locale: parent.to_string(), namespace: Some(stem.to_string()) })
}

/// Mirrors `path`, a file of locale `from`, into the equivalent file of locale `to`.
///
/// The file stem is replaced when it is the locale, otherwise the parent directory.
pub(crate) fn mirror_path(path: &Path, from: &str, to: &str) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    if stem == from {
        let mut file_name = to.to_string();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            file_name.push('.');
            file_name.push_str(extension);
        }
        return Some(path.with_file_name(file_name));
    }

    let parent = path.parent()?;
    if parent.file_name()?.to_str()? == from {
        return Some(parent.with_file_name(to).join(path.file_name()?));
    }
    None
}
