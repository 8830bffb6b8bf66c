//! Dependency-tree data for display.
//!
//! Presentation only: children sort by name here, while execution order is
//! whatever the concurrency fan-out produces.

use std::path::Path;

use crate::recipe::Recipe;

/// One node of the rendered dependency tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Recipe name
    pub name: String,
    /// Input parameters (dependency outputs plus declared inputs)
    pub inputs: Vec<String>,
    /// Output parameters
    pub outputs: Vec<String>,
    /// Direct dependencies, sorted by name
    pub children: Vec<TreeEntry>,
}

impl TreeEntry {
    /// Snapshot a recipe and its dependencies
    #[must_use]
    pub fn from_recipe(recipe: &Recipe, cwd: Option<&Path>) -> Self {
        Self {
            name: recipe.name().to_string(),
            inputs: recipe.input().to_params(cwd),
            outputs: recipe.output().to_params(cwd),
            children: recipe
                .direct_dependencies()
                .iter()
                .map(|dep| Self::from_recipe(dep, cwd))
                .collect(),
        }
    }

    /// Render as indented lines
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![self.label()];
        for child in &self.children {
            for line in child.render() {
                lines.push(format!("    {line}"));
            }
        }
        lines
    }

    fn label(&self) -> String {
        let mut label = self.name.clone();
        if !self.inputs.is_empty() {
            label.push_str(&format!(" <- {}", self.inputs.join(" ")));
        }
        if !self.outputs.is_empty() {
            label.push_str(&format!(" -> {}", self.outputs.join(" ")));
        }
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Work;
    use async_trait::async_trait;
    use buttress_core::{Artifact, BuildResult};

    struct FileWork(&'static str);

    #[async_trait]
    impl Work for FileWork {
        fn output(&self) -> Artifact {
            Artifact::file(self.0)
        }

        async fn perform(&self, _input: &Artifact) -> BuildResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tree_structure() {
        let world = Recipe::new("world", true, vec![], Box::new(FileWork("world.txt")));
        let hello = Recipe::new("hello", true, vec![], Box::new(FileWork("hello.txt")));
        let top = Recipe::new(
            "hello_world",
            true,
            vec![world, hello],
            Box::new(FileWork("helloworld.txt")),
        );

        let tree = TreeEntry::from_recipe(&top, None);
        assert_eq!(tree.name, "hello_world");
        assert_eq!(tree.inputs, vec!["world.txt", "hello.txt"]);
        assert_eq!(tree.outputs, vec!["helloworld.txt"]);

        // Children sorted by name, regardless of declaration order.
        let child_names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(child_names, vec!["hello", "world"]);
    }

    #[test]
    fn test_render_indents_children() {
        let dep = Recipe::new("dep", false, vec![], Box::new(FileWork("dep.txt")));
        let top = Recipe::new("top", true, vec![dep], Box::new(FileWork("top.txt")));

        let lines = TreeEntry::from_recipe(&top, None).render();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("top"));
        assert!(lines[1].starts_with("    dep"));
    }
}
