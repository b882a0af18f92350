use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::MethodDescriptor;

/// Number of declared parameters of a method descriptor (receiver excluded).
pub(crate) fn method_param_count(descriptor: &str) -> Result<usize> {
    let descriptor = MethodDescriptor::from_str(descriptor)
        .with_context(|| format!("parse method descriptor {descriptor}"))?;
    Ok(descriptor.parameter_types().len())
}

pub(crate) fn returns_void(descriptor: &str) -> bool {
    descriptor.ends_with(")V")
}

/// Dotted Java name of a binary class name (`a/b/C$D` → `a.b.C.D`).
pub fn java_class_name(binary_name: &str) -> String {
    binary_name.replace(['/', '$'], ".")
}

/// Renders `(ILjava/lang/String;)V` as `(int, java.lang.String) : void`.
pub fn render_method_descriptor(descriptor: &str) -> String {
    let Some(rest) = descriptor.strip_prefix('(') else {
        return descriptor.to_string();
    };
    let Some((params, ret)) = rest.split_once(')') else {
        return descriptor.to_string();
    };
    let mut rendered = Vec::new();
    let mut remaining = params;
    while !remaining.is_empty() {
        match split_field_type(remaining) {
            Some((ty, tail)) => {
                rendered.push(render_field_descriptor(ty));
                remaining = tail;
            }
            None => return descriptor.to_string(),
        }
    }
    format!("({}) : {}", rendered.join(", "), render_field_descriptor(ret))
}

/// Renders a single field descriptor as a Java type name.
pub fn render_field_descriptor(descriptor: &str) -> String {
    let dimensions = descriptor.chars().take_while(|c| *c == '[').count();
    let element = &descriptor[dimensions..];
    let base = match element {
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "D" => "double".to_string(),
        "F" => "float".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "S" => "short".to_string(),
        "Z" => "boolean".to_string(),
        "V" => "void".to_string(),
        other => match other.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
            Some(class_name) => java_class_name(class_name),
            None => other.to_string(),
        },
    };
    format!("{base}{}", "[]".repeat(dimensions))
}

fn split_field_type(input: &str) -> Option<(&str, &str)> {
    let dimensions = input.chars().take_while(|c| *c == '[').count();
    let element = input.get(dimensions..)?;
    let first = element.chars().next()?;
    let end = match first {
        'L' => dimensions + element.find(';')? + 1,
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => dimensions + 1,
        _ => return None,
    };
    Some((&input[..end], &input[end..]))
}
