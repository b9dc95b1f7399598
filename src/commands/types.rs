//! `keel types`

use anyhow::Result;
use colored::Colorize;
use declarative::{Registry, Shape};

use crate::Context;
use crate::resource::{AnyResource, builtin_registry};
use crate::ui;

/// Registered types in sorted order, with their shape and identifying field.
pub fn rows(registry: &Registry<AnyResource>) -> Result<Vec<(&'static str, Shape, &'static str)>> {
    let mut rows = Vec::new();
    for name in registry.type_names() {
        rows.push((name, registry.shape(name)?, registry.id_field(name)?));
    }
    Ok(rows)
}

pub fn run(ctx: &Context) -> Result<()> {
    let registry = builtin_registry();
    if !ctx.quiet {
        ui::header("Resource Types");
    }
    for (name, shape, id_field) in rows(&registry)? {
        if ctx.verbose > 0 {
            println!("  {:<20} {:<8} {}", name.bold(), shape, format!("id: {id_field}").dimmed());
        } else {
            println!("  {:<20} {}", name.bold(), shape);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_sorted_with_shapes() {
        let rows = rows(&builtin_registry()).unwrap();
        assert_eq!(
            rows,
            vec![
                ("apt_package", Shape::Group, "package"),
                ("dpkg_alternative", Shape::Single, "name"),
                ("file", Shape::Single, "path"),
            ]
        );
    }
}
