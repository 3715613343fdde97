use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;

/// Leading `NAME=value` words of one command, as produced by the parser.
pub type Assignments = BTreeMap<String, String>;

/// Name -> value snapshot of environment variables.
///
/// Clones share storage and `set`/`unset` copy on write, so a snapshot handed
/// to a running stage never changes underneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Arc<BTreeMap<String, String>>,
}

impl Environment {
    /// Captures the current process environment. Entries that are not valid
    /// UTF-8 or have an empty name are skipped.
    pub fn capture() -> Self {
        let mut vars = BTreeMap::new();
        for (k, v) in std::env::vars_os() {
            let (Ok(k), Ok(v)) = (k.into_string(), v.into_string()) else { continue };
            if k.is_empty() || k.contains('=') { continue; }
            vars.insert(k, v);
        }
        Environment { vars: Arc::new(vars) }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        Arc::make_mut(&mut self.vars).insert(name.into(), value.into());
    }

    /// Returns a derived snapshot with `overrides` layered on top; `self` is untouched.
    pub fn with_overrides<'a, I>(&self, overrides: I) -> Environment
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut derived = self.clone();
        for (name, value) in overrides { derived.set(name.clone(), value.clone()); }
        derived
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `NAME=VALUE` strings, sorted, suitable for an exec-style environment.
    pub fn to_env_strings(&self) -> Vec<String> {
        let mut out: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        out.sort();
        out
    }

    /// Replaces the environment of `cmd` with exactly this snapshot. The
    /// standard library turns it into the platform's native block (envp on
    /// Unix, the sorted wide-string block on Windows) at spawn time.
    pub fn apply_to(&self, cmd: &mut Command) {
        cmd.env_clear();
        cmd.envs(self.iter());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Environment { vars: Arc::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_do_not_touch_the_base() {
        let base: Environment = [("A", "1"), ("B", "2")].into_iter().collect();
        let mut over = Assignments::new();
        over.insert("B".into(), "x".into());
        over.insert("C".into(), "3".into());
        let derived = base.with_overrides(&over);
        assert_eq!(derived.get("B"), Some("x"));
        assert_eq!(derived.get("C"), Some("3"));
        assert_eq!(base.get("B"), Some("2"));
        assert_eq!(base.get("C"), None);
    }

    #[test]
    fn snapshot_survives_later_mutation() {
        let mut base: Environment = [("A", "1")].into_iter().collect();
        let snap = base.clone();
        base.set("A", "2");
        assert_eq!(snap.get("A"), Some("1"));
        assert_eq!(base.get("A"), Some("2"));
    }

    #[test]
    fn env_strings_are_sorted_pairs() {
        let env: Environment = [("Z", "last"), ("A1", "x"), ("A", "y")].into_iter().collect();
        assert_eq!(env.to_env_strings(), vec!["A1=x", "A=y", "Z=last"]);
    }

    #[test]
    fn capture_sees_process_variables() {
        let env = Environment::capture();
        if let Ok(path) = std::env::var("PATH") { assert_eq!(env.get("PATH"), Some(path.as_str())); }
    }
}
