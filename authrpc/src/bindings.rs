//! Server interface descriptors and the client bindings generated from them.
//!
//! A [`ServerDescriptor`] is produced by the [`rpc_service!`][crate::rpc_service]
//! macro from the same declaration that produces the server dispatch code, so
//! the two always agree. Bindings are regenerated wholesale from the
//! descriptor and never edited in place.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use authrpc_schemas::{DumpArg, DumpKind, DumpOperation, DumpServer};
use ts_rs::{TS, TypeVisitor};

use crate::error::Result;

/// The package the generated bindings import their wrapper types from.
pub const DEFAULT_CLIENT_PACKAGE: &str = "@qubit-rs/client";

/// The file written inside a bindings directory.
pub const BINDINGS_FILE: &str = "index.ts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    /// Reads data without side effects observable to the caller.
    Query,
    Mutation,
    /// Streams values to the caller until either side hangs up.
    Subscription,
}

impl OperationKind {
    pub fn ts_name(self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }

    fn dump(self) -> DumpKind {
        match self {
            OperationKind::Query => DumpKind::Query,
            OperationKind::Mutation => DumpKind::Mutation,
            OperationKind::Subscription => DumpKind::Subscription,
        }
    }

    /// Whether a failed call may safely be sent again.
    pub fn is_idempotent(self) -> bool {
        matches!(self, OperationKind::Query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    name: String,
    kind: OperationKind,
    args: Vec<(String, String)>,
    returns: String,
}

impl OperationDescriptor {
    pub fn new<S: Into<String>>(name: S, kind: OperationKind) -> OperationDescriptor {
        OperationDescriptor {
            name: name.into(),
            kind,
            args: Vec::new(),
            returns: "null".to_owned(),
        }
    }

    pub fn arg<N: Into<String>, T: Into<String>>(mut self, name: N, ts_type: T) -> Self {
        self.args.push((name.into(), ts_type.into()));
        self
    }

    /// Add an argument typed after the Rust type `T`.
    pub fn arg_of<T: TS + ?Sized, N: Into<String>>(self, name: N) -> Self {
        self.arg(name, T::name())
    }

    pub fn returns<T: Into<String>>(mut self, ts_type: T) -> Self {
        self.returns = ts_type.into();
        self
    }

    pub fn returns_of<T: TS + ?Sized>(self) -> Self {
        self.returns(T::name())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    pub fn return_type(&self) -> &str {
        &self.returns
    }

    /// `Query<(a: number) => Promise<string>>`
    pub fn ts_signature(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(name, ty)| format!("{name}: {ty}"))
            .collect();
        format!(
            "{}<({}) => Promise<{}>>",
            self.kind.ts_name(),
            args.join(", "),
            self.returns
        )
    }
}

/// Whether a bindings file on disk matches its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingsStatus {
    UpToDate,
    Stale,
    Missing,
}

/// Walks a type and everything it mentions, recording a declaration for
/// each user-defined type. Builtins such as `Option` or `Vec` have no output
/// path and are only looked through.
struct TypeCollector<'a>(&'a mut BTreeMap<String, String>);

impl TypeVisitor for TypeCollector<'_> {
    fn visit<T: TS + 'static + ?Sized>(&mut self) {
        if T::output_path().is_none() {
            T::visit_generics(self);
            return;
        }
        let ident = T::ident();
        if self.0.contains_key(&ident) {
            return;
        }
        self.0.insert(ident, format!("export {}", T::decl()));
        T::visit_dependencies(self);
        T::visit_generics(self);
    }
}

/// A named mapping from operation name to operation signature, together with
/// the user types those signatures mention and any nested servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    name: String,
    client_package: String,
    operations: BTreeMap<String, OperationDescriptor>,
    types: BTreeMap<String, String>,
    nested: BTreeMap<String, ServerDescriptor>,
}

impl ServerDescriptor {
    pub fn new<S: Into<String>>(name: S) -> ServerDescriptor {
        ServerDescriptor {
            name: name.into(),
            client_package: DEFAULT_CLIENT_PACKAGE.to_owned(),
            operations: BTreeMap::new(),
            types: BTreeMap::new(),
            nested: BTreeMap::new(),
        }
    }

    pub fn with_client_package<S: Into<String>>(mut self, package: S) -> Self {
        self.client_package = package.into();
        self
    }

    pub fn operation(mut self, op: OperationDescriptor) -> Self {
        if self.nested.remove(&op.name).is_some() {
            log::warn!("{}: operation {} replaces a nested server", self.name, op.name);
        }
        self.operations.insert(op.name.clone(), op);
        self
    }

    /// Declare `T` and every user type it refers to in the bindings.
    pub fn declare<T: TS + 'static + ?Sized>(mut self) -> Self {
        TypeCollector(&mut self.types).visit::<T>();
        self
    }

    /// Expose `child` as a member of this server under `name`.
    pub fn nest<S: Into<String>>(mut self, name: S, child: ServerDescriptor) -> Self {
        let name = name.into();
        if self.operations.remove(&name).is_some() {
            log::warn!("{}: nested server {name} replaces an operation", self.name);
        }
        self.nested.insert(name, child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_package(&self) -> &str {
        &self.client_package
    }

    /// Operations in name order.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values()
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(|x| x.as_str()).collect()
    }

    pub fn nested(&self) -> impl Iterator<Item = (&str, &ServerDescriptor)> {
        self.nested.iter().map(|(name, child)| (name.as_str(), child))
    }

    /// Names of the user types declared here or in a nested server.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names = BTreeSet::new();
        self.collect_types(&mut names, &mut BTreeMap::new());
        names.into_iter().collect()
    }

    fn collect_kinds(&self, out: &mut BTreeSet<&'static str>) {
        out.extend(self.operations().map(|op| op.kind.ts_name()));
        for child in self.nested.values() {
            child.collect_kinds(out);
        }
    }

    fn collect_types<'a>(
        &'a self,
        names: &mut BTreeSet<&'a str>,
        decls: &mut BTreeMap<&'a str, &'a str>,
    ) {
        for (name, decl) in &self.types {
            names.insert(name.as_str());
            decls.insert(name.as_str(), decl.as_str());
        }
        for child in self.nested.values() {
            child.collect_types(names, decls);
        }
    }

    /// `{ a: Query<...>, child: { b: Mutation<...> } }`, members in name order.
    fn render_members(&self) -> String {
        let mut members: BTreeMap<&str, String> = self
            .operations()
            .map(|op| (op.name.as_str(), op.ts_signature()))
            .collect();
        for (name, child) in &self.nested {
            members.insert(name, child.render_members());
        }
        let members: Vec<String> = members
            .into_iter()
            .map(|(name, sig)| format!("{name}: {sig}"))
            .collect();
        format!("{{ {} }}", members.join(", "))
    }

    pub fn render_typescript(&self) -> String {
        let mut kinds = BTreeSet::new();
        self.collect_kinds(&mut kinds);
        let kinds: Vec<&str> = kinds.into_iter().collect();
        let mut decls = BTreeMap::new();
        self.collect_types(&mut BTreeSet::new(), &mut decls);

        let mut out = String::new();
        if !kinds.is_empty() {
            out.push_str(&format!(
                "import type {{ {} }} from \"{}\";\n",
                kinds.join(", "),
                self.client_package
            ));
        }
        for decl in decls.values() {
            out.push_str(decl);
            out.push('\n');
        }
        out.push_str(&format!(
            "export type {} = {};\n",
            self.name,
            self.render_members()
        ));
        out
    }

    /// Write the bindings into `dir`, replacing any previous file. The new
    /// content is written next to the target and renamed over it, so readers
    /// never observe a partially written file.
    pub fn write_typescript<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let target = dir.join(BINDINGS_FILE);
        let tmp = dir.join(format!(".{BINDINGS_FILE}.tmp"));
        std::fs::write(&tmp, self.render_typescript())?;
        std::fs::rename(&tmp, &target)?;
        log::info!("wrote {} bindings to {}", self.name, target.display());
        Ok(target)
    }

    pub fn check_typescript<P: AsRef<Path>>(&self, dir: P) -> Result<BindingsStatus> {
        let target = dir.as_ref().join(BINDINGS_FILE);
        match std::fs::read_to_string(&target) {
            Ok(current) if current == self.render_typescript() => Ok(BindingsStatus::UpToDate),
            Ok(_) => Ok(BindingsStatus::Stale),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BindingsStatus::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Nested servers are dumped with their member name as label.
    pub fn to_dump<L: Into<String>, R: Into<String>>(&self, label: L, revision: R) -> DumpServer {
        let revision = revision.into();
        let operations = self
            .operations()
            .map(|op| {
                let dump = DumpOperation {
                    kind: op.kind.dump(),
                    args: op
                        .args
                        .iter()
                        .map(|(name, ty)| DumpArg {
                            name: name.clone(),
                            ts_type: ty.clone(),
                        })
                        .collect(),
                    returns: op.returns.clone(),
                };
                (op.name.clone(), dump)
            })
            .collect();
        let nested = self
            .nested
            .iter()
            .map(|(name, child)| (name.clone(), child.to_dump(name.clone(), revision.clone())))
            .collect();
        DumpServer {
            revision,
            name: self.name.clone(),
            label: label.into(),
            operations,
            types: self.types.clone(),
            nested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cookie_server() -> ServerDescriptor {
        ServerDescriptor::new("QubitServer")
            .operation(OperationDescriptor::new("secret_endpoint", OperationKind::Query).returns("string"))
            .operation(OperationDescriptor::new("echo_cookie", OperationKind::Query).returns("string"))
    }

    #[test]
    fn renders_query_only_server() {
        assert_eq!(
            cookie_server().render_typescript(),
            "import type { Query } from \"@qubit-rs/client\";\n\
             export type QubitServer = { echo_cookie: Query<() => Promise<string>>, secret_endpoint: Query<() => Promise<string>> };\n"
        );
    }

    #[test]
    fn renders_arguments_and_mixed_kinds() {
        let desc = ServerDescriptor::new("Counter")
            .with_client_package("./client")
            .operation(
                OperationDescriptor::new("add", OperationKind::Mutation)
                    .arg("by", "number")
                    .arg("note", "string | null")
                    .returns("number"),
            )
            .operation(OperationDescriptor::new("get", OperationKind::Query).returns("number"));
        assert_eq!(
            desc.render_typescript(),
            "import type { Mutation, Query } from \"./client\";\n\
             export type Counter = { add: Mutation<(by: number, note: string | null) => Promise<number>>, get: Query<() => Promise<number>> };\n"
        );
    }

    #[test]
    fn empty_server_has_no_import() {
        assert_eq!(
            ServerDescriptor::new("Nothing").render_typescript(),
            "export type Nothing = {  };\n"
        );
    }

    #[derive(TS)]
    #[allow(dead_code)]
    struct Metadata {
        param_a: String,
        more_metadata: Option<Box<Metadata>>,
    }

    #[derive(TS)]
    #[allow(dead_code)]
    struct User {
        name: String,
        age: u32,
        metadata: Metadata,
    }

    fn user_server() -> ServerDescriptor {
        ServerDescriptor::new("UserServer")
            .operation(
                OperationDescriptor::new("get", OperationKind::Query)
                    .arg_of::<String, _>("id")
                    .returns_of::<Option<User>>(),
            )
            .operation(
                OperationDescriptor::new("watch", OperationKind::Subscription)
                    .arg_of::<u32, _>("min")
                    .returns_of::<u32>(),
            )
            .declare::<String>()
            .declare::<Option<User>>()
            .declare::<u32>()
    }

    #[test]
    fn user_types_are_declared_with_their_dependencies() {
        let desc = user_server();
        assert_eq!(desc.type_names(), vec!["Metadata", "User"]);

        let rendered = desc.render_typescript();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4, "{rendered}");
        assert_eq!(
            lines[0],
            "import type { Query, Subscription } from \"@qubit-rs/client\";"
        );
        assert!(lines[1].starts_with("export type Metadata = "), "{}", lines[1]);
        assert!(lines[1].contains("more_metadata: Metadata | null"), "{}", lines[1]);
        assert!(lines[2].starts_with("export type User = "), "{}", lines[2]);
        assert!(lines[2].contains("metadata: Metadata"), "{}", lines[2]);
        assert_eq!(
            lines[3],
            "export type UserServer = { get: Query<(id: string) => Promise<User | null>>, watch: Subscription<(min: number) => Promise<number>> };"
        );
    }

    #[test]
    fn primitives_declare_nothing() {
        let desc = cookie_server().declare::<String>().declare::<Vec<Option<bool>>>();
        assert!(desc.type_names().is_empty());
        assert_eq!(desc.render_typescript(), cookie_server().render_typescript());
    }

    #[test]
    fn nested_servers_render_inline() {
        let desc = cookie_server().nest("user", user_server());
        let rendered = desc.render_typescript();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines[0],
            "import type { Query, Subscription } from \"@qubit-rs/client\";"
        );
        assert_eq!(desc.type_names(), vec!["Metadata", "User"]);
        assert_eq!(
            lines.last().copied(),
            Some(
                "export type QubitServer = { echo_cookie: Query<() => Promise<string>>, secret_endpoint: Query<() => Promise<string>>, user: { get: Query<(id: string) => Promise<User | null>>, watch: Subscription<(min: number) => Promise<number>> } };"
            )
        );

        let dump = desc.to_dump("auth", "r1");
        assert_eq!(dump.nested["user"].label, "user");
        assert_eq!(dump.nested["user"].revision, "r1");
        assert_eq!(dump.nested["user"].operations["watch"].kind, DumpKind::Subscription);
        assert!(dump.nested["user"].types.contains_key("User"));
    }

    #[test]
    fn nesting_replaces_a_same_named_operation() {
        let desc = cookie_server().nest("echo_cookie", ServerDescriptor::new("Empty"));
        assert_eq!(desc.names(), vec!["secret_endpoint"]);
        assert_eq!(desc.nested().map(|(name, _)| name).collect::<Vec<_>>(), vec!["echo_cookie"]);
    }

    #[test]
    fn write_replaces_and_check_detects_drift() {
        let dir = tempfile::tempdir().unwrap();
        let desc = cookie_server();
        assert_eq!(desc.check_typescript(dir.path()).unwrap(), BindingsStatus::Missing);

        let path = desc.write_typescript(dir.path().join("bindings")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), desc.render_typescript());
        assert_eq!(
            desc.check_typescript(dir.path().join("bindings")).unwrap(),
            BindingsStatus::UpToDate
        );

        let grown = desc.clone().operation(OperationDescriptor::new("whoami", OperationKind::Query));
        assert_eq!(
            grown.check_typescript(dir.path().join("bindings")).unwrap(),
            BindingsStatus::Stale
        );

        grown.write_typescript(dir.path().join("bindings")).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("bindings"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(BINDINGS_FILE)]);
    }

    #[test]
    fn dump_mirrors_descriptor() {
        let dump = cookie_server().to_dump("auth", "deadbeef");
        assert_eq!(dump.name, "QubitServer");
        assert_eq!(dump.label, "auth");
        assert_eq!(
            dump.operations.keys().collect::<Vec<_>>(),
            vec!["echo_cookie", "secret_endpoint"]
        );
        assert_eq!(dump.operations["echo_cookie"].kind, DumpKind::Query);
        assert!(dump.operations["echo_cookie"].args.is_empty());
    }
}
