// src/conducting/routes.rs

use tracing::debug;

/// Registry of routes, each identified by the transitions that split it off
/// from the root route.
///
/// Route `0` has an empty path. Entering a split task through transition `k`
/// on route `r` yields the route whose path is `path(r) + [k]`; the same
/// arrival always maps back to the same route.
#[derive(Debug, Clone)]
pub struct Routes {
    paths: Vec<Vec<String>>,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            paths: vec![Vec::new()],
        }
    }
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path(&self, route: usize) -> Option<&[String]> {
        self.paths.get(route).map(Vec::as_slice)
    }

    /// Route for an arrival at a split task through `transition_key`.
    pub fn branch(&mut self, parent: usize, transition_key: &str) -> usize {
        let mut path = self.paths.get(parent).cloned().unwrap_or_default();
        path.push(transition_key.to_string());
        self.intern(path)
    }

    /// Longest common ancestor of the given routes.
    pub fn common(&mut self, routes: &[usize]) -> usize {
        let mut iter = routes.iter().filter_map(|r| self.paths.get(*r));
        let Some(first) = iter.next() else {
            return 0;
        };

        let mut prefix: &[String] = first;
        for path in iter {
            let shared = prefix
                .iter()
                .zip(path.iter())
                .take_while(|(a, b)| a == b)
                .count();
            prefix = &prefix[..shared];
        }

        let prefix = prefix.to_vec();
        self.intern(prefix)
    }

    fn intern(&mut self, path: Vec<String>) -> usize {
        if let Some(route) = self.paths.iter().position(|p| *p == path) {
            return route;
        }
        self.paths.push(path);
        let route = self.paths.len() - 1;
        debug!(route, path = ?self.paths[route], "route created");
        route
    }
}
