//! Key registry.
//!
//! Keys live as files under a keychain directory:
//!
//! ```text
//! <data_dir>/argonchat/
//!     keychain.toml      register: id, kind, filename, alias
//!     private/*.bin      vault-protected private keys
//!     public/*.asc       armored public keys
//! ```
//!
//! Keys are referred to by alias or numeric id. The alias `main` is used when
//! no name is given.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Alias used when none is given.
pub const DEFAULT_ALIAS: &str = "main";

/// Register file name.
pub const REGISTER_FILE: &str = "keychain.toml";

/// Private ids are allocated from 1001.
const PRIVATE_ID_BASE: u32 = 1000;

/// Public ids are allocated from 2001.
const PUBLIC_ID_BASE: u32 = 2000;

/// Errors that can occur during keychain operations.
#[derive(Error, Debug)]
pub enum KeychainError {
    #[error("No {kind} key found for '{name}'")]
    NotFound { kind: KeyKind, name: String },

    #[error("Key id not found: {0}")]
    UnknownId(u32),

    #[error("Alias '{alias}' is already bound to a {kind} key")]
    AliasTaken { alias: String, kind: KeyKind },

    #[error("Data directory not found. Unable to determine home directory.")]
    NoDataDir,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Private or public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Private,
    Public,
}

impl KeyKind {
    fn id_base(self) -> u32 {
        match self {
            Self::Private => PRIVATE_ID_BASE,
            Self::Public => PUBLIC_ID_BASE,
        }
    }

    /// File extension for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Private => "bin",
            Self::Public => "asc",
        }
    }

    fn dir_name(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Private => "private",
            Self::Public => "public",
        })
    }
}

/// One registered key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub id: u32,
    pub kind: KeyKind,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Register {
    #[serde(default, rename = "key")]
    keys: Vec<KeyEntry>,
}

/// A keychain rooted at one directory.
#[derive(Debug)]
pub struct Keychain {
    root: PathBuf,
    register: Register,
}

impl Keychain {
    /// `<data_dir>/argonchat`.
    pub fn default_root() -> Result<PathBuf, KeychainError> {
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .map(|dir| dir.join("argonchat"))
            .ok_or(KeychainError::NoDataDir)
    }

    /// Opens the keychain at the default location.
    pub fn open_default() -> Result<Self, KeychainError> {
        Self::open(&Self::default_root()?)
    }

    /// Opens the keychain at `root`, creating its directories if needed.
    pub fn open(root: &Path) -> Result<Self, KeychainError> {
        fs::create_dir_all(root.join(KeyKind::Private.dir_name()))?;
        fs::create_dir_all(root.join(KeyKind::Public.dir_name()))?;

        let register_path = root.join(REGISTER_FILE);
        let register = if register_path.exists() {
            toml::from_str(&fs::read_to_string(&register_path)?)?
        } else {
            Register::default()
        };

        Ok(Self {
            root: root.to_path_buf(),
            register,
        })
    }

    /// Writes the register.
    pub fn save(&self) -> Result<(), KeychainError> {
        let content = toml::to_string_pretty(&self.register)?;
        fs::write(self.root.join(REGISTER_FILE), content)?;
        Ok(())
    }

    /// Directory holding keys of `kind`.
    pub fn dir(&self, kind: KeyKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Full path of a registered key.
    pub fn path_of(&self, entry: &KeyEntry) -> PathBuf {
        self.dir(entry.kind).join(&entry.filename)
    }

    /// All entries, private keys first, each group by id.
    pub fn entries(&self) -> Vec<&KeyEntry> {
        let mut entries: Vec<_> = self.register.keys.iter().collect();
        entries.sort_by_key(|e| (e.kind != KeyKind::Private, e.id));
        entries
    }

    /// Registers key files present on disk but missing from the register.
    ///
    /// Only `.bin` files count as private keys and `.asc` files as public keys.
    /// Returns how many entries were added.
    pub fn sync(&mut self) -> Result<usize, KeychainError> {
        let mut added = 0;
        for kind in [KeyKind::Private, KeyKind::Public] {
            let mut files: Vec<String> = fs::read_dir(self.dir(kind))?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.ends_with(&format!(".{}", kind.extension())))
                .collect();
            files.sort();

            for filename in files {
                if !self.is_registered(kind, &filename) {
                    let id = self.add(kind, &filename);
                    debug!(id, filename = %filename, "registered key file");
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Registers a file name and returns its new id.
    pub fn add(&mut self, kind: KeyKind, filename: &str) -> u32 {
        let id = self.next_id(kind);
        self.register.keys.push(KeyEntry {
            id,
            kind,
            filename: filename.to_string(),
            alias: None,
        });
        id
    }

    /// Registers `<stem>.bin` and `<stem>.asc` as one key pair.
    ///
    /// The pair is bound to `alias` when given. Without one, a pair named
    /// `main` takes the default alias if no other key holds it yet.
    /// Returns the private and public ids.
    pub fn add_pair(
        &mut self,
        stem: &str,
        alias: Option<&str>,
    ) -> Result<(u32, u32), KeychainError> {
        let alias = match alias {
            Some(alias) => Some(alias),
            None if stem == DEFAULT_ALIAS
                && !self.has_alias(KeyKind::Private, DEFAULT_ALIAS)
                && !self.has_alias(KeyKind::Public, DEFAULT_ALIAS) =>
            {
                Some(DEFAULT_ALIAS)
            }
            None => None,
        };

        let private_id = self.add(
            KeyKind::Private,
            &format!("{}.{}", stem, KeyKind::Private.extension()),
        );
        let public_id = self.add(
            KeyKind::Public,
            &format!("{}.{}", stem, KeyKind::Public.extension()),
        );
        if let Some(alias) = alias {
            self.bind_alias(private_id, alias)?;
            self.bind_alias(public_id, alias)?;
        }
        Ok((private_id, public_id))
    }

    fn has_alias(&self, kind: KeyKind, alias: &str) -> bool {
        self.register
            .keys
            .iter()
            .any(|e| e.kind == kind && e.alias.as_deref() == Some(alias))
    }

    /// Binds `alias` to key `id`. An alias names at most one key of each kind.
    pub fn bind_alias(&mut self, id: u32, alias: &str) -> Result<(), KeychainError> {
        let kind = self.get(id).ok_or(KeychainError::UnknownId(id))?.kind;

        let taken = self
            .register
            .keys
            .iter()
            .any(|e| e.id != id && e.kind == kind && e.alias.as_deref() == Some(alias));
        if taken {
            return Err(KeychainError::AliasTaken {
                alias: alias.to_string(),
                kind,
            });
        }

        if let Some(entry) = self.register.keys.iter_mut().find(|e| e.id == id) {
            entry.alias = Some(alias.to_string());
        }
        Ok(())
    }

    /// Removes key `id` from the register, optionally deleting its file.
    pub fn remove(&mut self, id: u32, delete_file: bool) -> Result<KeyEntry, KeychainError> {
        let index = self
            .register
            .keys
            .iter()
            .position(|e| e.id == id)
            .ok_or(KeychainError::UnknownId(id))?;
        let entry = self.register.keys.remove(index);

        if delete_file {
            let path = self.path_of(&entry);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(entry)
    }

    /// Entry with `id`.
    pub fn get(&self, id: u32) -> Option<&KeyEntry> {
        self.register.keys.iter().find(|e| e.id == id)
    }

    /// Finds a key of `kind` by alias or numeric id, defaulting to `main`.
    pub fn lookup(&self, kind: KeyKind, name: Option<&str>) -> Result<&KeyEntry, KeychainError> {
        let name = name.unwrap_or(DEFAULT_ALIAS);
        let by_id = name.parse::<u32>().ok();

        self.register
            .keys
            .iter()
            .filter(|e| e.kind == kind)
            .find(|e| Some(e.id) == by_id || e.alias.as_deref() == Some(name))
            .ok_or_else(|| KeychainError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Resolves a path, alias or id to a key file.
    ///
    /// Anything that looks like a path is returned as-is.
    pub fn resolve(&self, kind: KeyKind, name: Option<&str>) -> Result<PathBuf, KeychainError> {
        if let Some(name) = name {
            if name.contains('/') || name.contains('\\') || name.contains('.') {
                return Ok(PathBuf::from(name));
            }
        }
        Ok(self.path_of(self.lookup(kind, name)?))
    }

    fn is_registered(&self, kind: KeyKind, filename: &str) -> bool {
        self.register
            .keys
            .iter()
            .any(|e| e.kind == kind && e.filename == filename)
    }

    fn next_id(&self, kind: KeyKind) -> u32 {
        self.register
            .keys
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.id)
            .max()
            .unwrap_or(kind.id_base())
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_keychain() -> (TempDir, Keychain) {
        let temp_dir = TempDir::new().unwrap();
        let keychain = Keychain::open(temp_dir.path()).unwrap();
        (temp_dir, keychain)
    }

    #[test]
    fn test_open_creates_layout() {
        let (dir, keychain) = setup_keychain();
        assert!(dir.path().join("private").is_dir());
        assert!(dir.path().join("public").is_dir());
        assert!(keychain.entries().is_empty());
    }

    #[test]
    fn test_ids_start_per_kind() {
        let (_dir, mut keychain) = setup_keychain();
        assert_eq!(keychain.add(KeyKind::Private, "me.bin"), 1001);
        assert_eq!(keychain.add(KeyKind::Public, "alice.asc"), 2001);
        assert_eq!(keychain.add(KeyKind::Private, "other.bin"), 1002);
        assert_eq!(keychain.add(KeyKind::Public, "bob.asc"), 2002);
    }

    #[test]
    fn test_sync_registers_only_matching_files() {
        let (dir, mut keychain) = setup_keychain();
        fs::write(dir.path().join("private/me.bin"), b"blob").unwrap();
        fs::write(dir.path().join("private/notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("public/alice.asc"), b"key").unwrap();
        fs::write(dir.path().join("public/stray.bin"), b"x").unwrap();

        assert_eq!(keychain.sync().unwrap(), 2);
        assert_eq!(keychain.sync().unwrap(), 0);

        let entries = keychain.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filename, "me.bin");
        assert_eq!(entries[0].kind, KeyKind::Private);
        assert_eq!(entries[1].filename, "alice.asc");
    }

    #[test]
    fn test_alias_binding_rules() {
        let (_dir, mut keychain) = setup_keychain();
        let private = keychain.add(KeyKind::Private, "me.bin");
        let public = keychain.add(KeyKind::Public, "me.asc");
        let second = keychain.add(KeyKind::Private, "old.bin");

        keychain.bind_alias(private, "main").unwrap();
        // One private and one public key may share an alias.
        keychain.bind_alias(public, "main").unwrap();

        assert!(matches!(
            keychain.bind_alias(second, "main"),
            Err(KeychainError::AliasTaken { kind: KeyKind::Private, .. })
        ));
        assert!(matches!(
            keychain.bind_alias(9999, "x"),
            Err(KeychainError::UnknownId(9999))
        ));
    }

    #[test]
    fn test_main_pair_takes_default_alias() {
        let (_dir, mut keychain) = setup_keychain();

        let (private, public) = keychain.add_pair(DEFAULT_ALIAS, None).unwrap();
        assert_eq!(keychain.lookup(KeyKind::Private, None).unwrap().id, private);
        assert_eq!(keychain.lookup(KeyKind::Public, None).unwrap().id, public);
        assert_eq!(keychain.get(private).unwrap().filename, "main.bin");
        assert_eq!(keychain.get(public).unwrap().filename, "main.asc");

        // Other stems stay unbound unless an alias is given.
        let (other, _) = keychain.add_pair("spare", None).unwrap();
        assert_eq!(keychain.get(other).unwrap().alias, None);
        let (work, _) = keychain.add_pair("work", Some("office")).unwrap();
        assert_eq!(
            keychain.lookup(KeyKind::Private, Some("office")).unwrap().id,
            work
        );
    }

    #[test]
    fn test_main_pair_leaves_existing_default_alone() {
        let (_dir, mut keychain) = setup_keychain();
        let old = keychain.add(KeyKind::Private, "old.bin");
        keychain.bind_alias(old, DEFAULT_ALIAS).unwrap();

        let (private, _) = keychain.add_pair(DEFAULT_ALIAS, None).unwrap();
        assert_eq!(keychain.get(private).unwrap().alias, None);
        assert_eq!(keychain.lookup(KeyKind::Private, None).unwrap().id, old);
    }

    #[test]
    fn test_lookup_by_alias_id_and_default() {
        let (dir, mut keychain) = setup_keychain();
        let private = keychain.add(KeyKind::Private, "me.bin");
        let public = keychain.add(KeyKind::Public, "alice.asc");
        keychain.bind_alias(private, "main").unwrap();
        keychain.bind_alias(public, "alice").unwrap();

        assert_eq!(keychain.lookup(KeyKind::Private, None).unwrap().id, private);
        assert_eq!(
            keychain.lookup(KeyKind::Public, Some("alice")).unwrap().id,
            public
        );
        assert_eq!(
            keychain.lookup(KeyKind::Public, Some("2001")).unwrap().filename,
            "alice.asc"
        );
        // Kinds don't mix.
        assert!(keychain.lookup(KeyKind::Private, Some("alice")).is_err());
        assert!(keychain.lookup(KeyKind::Public, None).is_err());

        assert_eq!(
            keychain.resolve(KeyKind::Public, Some("alice")).unwrap(),
            dir.path().join("public").join("alice.asc")
        );
        assert_eq!(
            keychain.resolve(KeyKind::Public, Some("./peer.asc")).unwrap(),
            PathBuf::from("./peer.asc")
        );
    }

    #[test]
    fn test_remove_and_delete_file() {
        let (dir, mut keychain) = setup_keychain();
        let path = dir.path().join("public/bob.asc");
        fs::write(&path, b"key").unwrap();
        keychain.sync().unwrap();

        let kept = keychain.remove(2001, false).unwrap();
        assert_eq!(kept.filename, "bob.asc");
        assert!(path.exists());

        keychain.sync().unwrap();
        keychain.remove(2001, true).unwrap();
        assert!(!path.exists());
        assert!(matches!(
            keychain.remove(2001, true),
            Err(KeychainError::UnknownId(2001))
        ));
    }

    #[test]
    fn test_save_and_reopen() {
        let (dir, mut keychain) = setup_keychain();
        let id = keychain.add(KeyKind::Private, "me.bin");
        keychain.bind_alias(id, "main").unwrap();
        keychain.save().unwrap();

        let content = fs::read_to_string(dir.path().join(REGISTER_FILE)).unwrap();
        assert!(content.contains("[[key]]"));

        let reopened = Keychain::open(dir.path()).unwrap();
        assert_eq!(reopened.lookup(KeyKind::Private, None).unwrap().id, id);
    }
}
