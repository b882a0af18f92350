use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use zip::ZipArchive;

use crate::error::VerificationError;
use crate::ir::{package_of, ClassFile, Origin};
use crate::resolver::{ResolutionResult, Resolver, UnionResolver};
use crate::scan::parse_class_bytes;

/// Prefix tree over slash-delimited package paths.
///
/// Indexing `a/b/C` makes `a/b` and `a` contained as well; the default package is contained
/// once a class without a package was indexed.
#[derive(Clone, Debug, Default)]
pub struct PackageSet {
    root: PackageNode,
}

#[derive(Clone, Debug, Default)]
struct PackageNode {
    children: BTreeMap<String, PackageNode>,
    has_classes: bool,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class_name: &str) {
        self.add_package(package_of(class_name));
    }

    pub fn add_package(&mut self, package: &str) {
        let mut node = &mut self.root;
        if !package.is_empty() {
            for segment in package.split('/') {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        node.has_classes = true;
    }

    pub fn contains_package(&self, package: &str) -> bool {
        if package.is_empty() {
            return self.root.has_classes || !self.root.children.is_empty();
        }
        let mut node = &self.root;
        for segment in package.split('/') {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        !self.root.has_classes && self.root.children.is_empty()
    }

    /// Every contained package path, in lexicographic order.
    pub fn packages(&self) -> Vec<String> {
        let mut result = Vec::new();
        collect_packages(&self.root, String::new(), &mut result);
        result
    }
}

fn collect_packages(node: &PackageNode, prefix: String, out: &mut Vec<String>) {
    for (segment, child) in &node.children {
        let path = if prefix.is_empty() {
            segment.clone()
        } else {
            format!("{prefix}/{segment}")
        };
        out.push(path.clone());
        collect_packages(child, path, out);
    }
}

fn index_packages<'a>(names: impl Iterator<Item = &'a String>) -> PackageSet {
    let mut packages = PackageSet::new();
    for name in names {
        packages.add_class(name);
    }
    packages
}

fn load_class(bytes: &[u8], expected_name: &str, origin: &Origin) -> ResolutionResult {
    match parse_class_bytes(bytes, origin) {
        Ok(class) if class.name == expected_name => ResolutionResult::Found(Arc::new(class)),
        Ok(class) => ResolutionResult::InvalidBinary(format!(
            "class file for {expected_name} declares {}",
            class.name
        )),
        Err(err) => {
            log::warn!("invalid class file {expected_name} in {origin}: {err:#}");
            ResolutionResult::InvalidBinary(format!("{err:#}"))
        }
    }
}

fn is_indexable_entry(name: &str) -> bool {
    name.ends_with(".class")
        && !name.ends_with("module-info.class")
        && !name.starts_with("META-INF/versions/")
}

/// Classes under a directory tree, keyed by binary name relative to the root.
pub struct DirectorySource {
    root: PathBuf,
    origin: Origin,
    classes: BTreeMap<String, PathBuf>,
    packages: PackageSet,
}

impl DirectorySource {
    pub fn open(root: &Path, origin: Origin) -> Result<Self, VerificationError> {
        let mut classes = BTreeMap::new();
        index_directory(root, root, &mut classes)?;
        let packages = index_packages(classes.keys());
        log::debug!(
            "indexed {} classes under {}",
            classes.len(),
            root.display()
        );
        Ok(Self {
            root: root.to_path_buf(),
            origin,
            classes,
            packages,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn index_directory(
    root: &Path,
    dir: &Path,
    classes: &mut BTreeMap<String, PathBuf>,
) -> Result<(), VerificationError> {
    let io_error = |source| VerificationError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        entries.push(entry.map_err(io_error)?.path());
    }
    // Keep deterministic ordering by sorting directory listings.
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            index_directory(root, &entry, classes)?;
            continue;
        }
        let Ok(relative) = entry.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !is_indexable_entry(&relative) {
            continue;
        }
        if let Some(name) = relative.strip_suffix(".class") {
            classes.insert(name.to_string(), entry);
        }
    }
    Ok(())
}

impl Resolver for DirectorySource {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        let Some(path) = self.classes.get(name) else {
            return ResolutionResult::NotFound;
        };
        match fs::read(path) {
            Ok(bytes) => load_class(&bytes, name, &self.origin),
            Err(err) => ResolutionResult::ReadFailure(format!("failed to read {}: {err}", path.display())),
        }
    }

    fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn contains_package(&self, package: &str) -> bool {
        self.packages.contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.classes.keys().cloned())
    }
}

/// Classes of a single jar (zip) archive.
///
/// The entry index is read once when the archive is opened; entries are inflated on demand
/// under a lock so one source can serve concurrent readers.
pub struct JarSource {
    path: PathBuf,
    origin: Origin,
    archive: Mutex<ZipArchive<fs::File>>,
    classes: BTreeMap<String, String>,
    packages: PackageSet,
}

impl JarSource {
    pub fn open(path: &Path, origin: Origin) -> Result<Self, VerificationError> {
        let file = fs::File::open(path).map_err(|source| VerificationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive = ZipArchive::new(file).map_err(|source| VerificationError::Zip {
            path: path.to_path_buf(),
            source,
        })?;

        let mut classes = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|source| VerificationError::Zip {
                    path: path.to_path_buf(),
                    source,
                })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if !is_indexable_entry(&name) {
                continue;
            }
            if let Some(class_name) = name.strip_suffix(".class") {
                classes.insert(class_name.to_string(), name.clone());
            }
        }
        let packages = index_packages(classes.keys());
        log::debug!("indexed {} classes in {}", classes.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            origin,
            archive: Mutex::new(archive),
            classes,
            packages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entry(&self, entry_name: &str) -> Result<Vec<u8>, String> {
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| format!("archive {} is poisoned", self.path.display()))?;
        let mut entry = archive
            .by_name(entry_name)
            .map_err(|err| format!("failed to read {}:{entry_name}: {err}", self.path.display()))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|err| format!("failed to read {}:{entry_name}: {err}", self.path.display()))?;
        Ok(data)
    }
}

impl Resolver for JarSource {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        let Some(entry_name) = self.classes.get(name) else {
            return ResolutionResult::NotFound;
        };
        match self.read_entry(entry_name) {
            Ok(bytes) => load_class(&bytes, name, &self.origin),
            Err(reason) => ResolutionResult::ReadFailure(reason),
        }
    }

    fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn contains_package(&self, package: &str) -> bool {
        self.packages.contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.classes.keys().cloned())
    }
}

enum MemoryEntry {
    Parsed(Arc<ClassFile>),
    Bytes(Vec<u8>),
}

/// Classes held in memory, either already parsed or as raw class-file bytes.
pub struct MemorySource {
    origin: Origin,
    classes: BTreeMap<String, MemoryEntry>,
    packages: PackageSet,
}

impl MemorySource {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            classes: BTreeMap::new(),
            packages: PackageSet::new(),
        }
    }

    /// Adds a parsed class; its origin is replaced by this source's origin.
    pub fn with_class(mut self, mut class: ClassFile) -> Self {
        class.origin = self.origin.clone();
        self.packages.add_class(&class.name);
        self.classes
            .insert(class.name.clone(), MemoryEntry::Parsed(Arc::new(class)));
        self
    }

    pub fn with_bytes(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.packages.add_class(name);
        self.classes
            .insert(name.to_string(), MemoryEntry::Bytes(bytes));
        self
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

impl Resolver for MemorySource {
    fn resolve_class(&self, name: &str) -> ResolutionResult {
        match self.classes.get(name) {
            Some(MemoryEntry::Parsed(class)) => ResolutionResult::Found(Arc::clone(class)),
            Some(MemoryEntry::Bytes(bytes)) => load_class(bytes, name, &self.origin),
            None => ResolutionResult::NotFound,
        }
    }

    fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn contains_package(&self, package: &str) -> bool {
        self.packages.contains_package(package)
    }

    fn all_classes(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.classes.keys().cloned())
    }
}

/// Opens a classpath entry: a directory of class files, a jar/zip archive, or one class file.
pub fn open_source(path: &Path, origin: Origin) -> Result<Arc<dyn Resolver>, VerificationError> {
    if path.is_dir() {
        return Ok(Arc::new(DirectorySource::open(path, origin)?));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jar" | "zip" => Ok(Arc::new(JarSource::open(path, origin)?)),
        "class" => {
            let bytes = fs::read(path).map_err(|source| VerificationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let class = parse_class_bytes(&bytes, &origin).map_err(|err| {
                VerificationError::UnreadableClass {
                    path: path.to_path_buf(),
                    reason: format!("{err:#}"),
                }
            })?;
            Ok(Arc::new(MemorySource::new(origin).with_class(class)))
        }
        _ => Err(VerificationError::UnsupportedSource {
            path: path.to_path_buf(),
        }),
    }
}

/// Opens every jar of a distribution's library directory (recursively) as one union, all
/// sharing `origin`.
pub fn open_library_directory(
    dir: &Path,
    origin: Origin,
) -> Result<UnionResolver, VerificationError> {
    let mut jars = Vec::new();
    collect_jars(dir, &mut jars)?;
    jars.sort();
    let mut children: Vec<Arc<dyn Resolver>> = Vec::with_capacity(jars.len());
    for jar in jars {
        children.push(Arc::new(JarSource::open(&jar, origin.clone())?));
    }
    Ok(UnionResolver::new(children))
}

fn collect_jars(dir: &Path, jars: &mut Vec<PathBuf>) -> Result<(), VerificationError> {
    let io_error = |source| VerificationError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_dir() {
            collect_jars(&path, jars)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jar"))
            .unwrap_or(false)
        {
            jars.push(path);
        }
    }
    Ok(())
}
