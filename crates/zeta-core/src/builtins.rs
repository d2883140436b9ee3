//! Built-in function registry.
//!
//! Builtins live in a fixed-order table; `OpGetBuiltin` operands index into
//! it, so the order is part of the compiled-artifact contract. Every
//! builtin takes the argument slice and returns `Some(value)` or `None`
//! (the VM pushes Null for `None`). Misuse never aborts the VM: it flows
//! back as an `Error` value the program can inspect.

use std::collections::HashMap;
use std::io::BufRead;
use std::rc::Rc;

use tracing::debug;

use crate::object::{HashKey, HashPair, Object};

pub type BuiltinFn = fn(&[Object]) -> Option<Object>;

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// The builtin table, in registry (opcode-operand) order.
pub const REGISTRY: &[Builtin] = &[
    Builtin { name: "len", func: len },
    Builtin { name: "puts", func: puts },
    Builtin { name: "putln", func: putln },
    Builtin { name: "gets", func: gets },
    Builtin { name: "first", func: first },
    Builtin { name: "last", func: last },
    Builtin { name: "rest", func: rest },
    Builtin { name: "push", func: push },
    Builtin { name: "pop", func: pop },
    Builtin { name: "fs.GetFiles", func: fs_get_files },
];

/// Look a builtin up by name (used by tests and diagnostics; compiled code
/// addresses builtins by index).
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.iter().find(|builtin| builtin.name == name)
}

fn new_error(message: String) -> Option<Object> {
    Some(Object::Error(message))
}

fn len(args: &[Object]) -> Option<Object> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Object::Str(value) => Some(Object::Integer(value.len() as i64)),
        Object::Array(elements) => Some(Object::Integer(elements.len() as i64)),
        Object::Hash(pairs) => Some(Object::Integer(pairs.len() as i64)),
        other => new_error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn puts(args: &[Object]) -> Option<Object> {
    for arg in args {
        print!("{}", arg.inspect());
    }
    None
}

fn putln(args: &[Object]) -> Option<Object> {
    for arg in args {
        println!("{}", arg.inspect());
    }
    None
}

/// Read one line and auto-detect its type: integer, then boolean, then
/// plain string.
fn gets(args: &[Object]) -> Option<Object> {
    if !args.is_empty() {
        return new_error(format!(
            "wrong number of arguments. got={}, want=0",
            args.len()
        ));
    }

    let mut line = String::new();
    let stdin = std::io::stdin();
    if stdin.lock().read_line(&mut line).is_err() {
        return new_error("something went wrong :/".to_string());
    }
    let line = line.trim_end_matches(['\n', '\r']);

    if let Ok(value) = line.parse::<i64>() {
        return Some(Object::Integer(value));
    }
    if let Ok(value) = line.parse::<bool>() {
        return Some(Object::Boolean(value));
    }
    Some(Object::Str(line.to_string()))
}

fn first(args: &[Object]) -> Option<Object> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Object::Array(elements) => elements.first().cloned(),
        other => new_error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn last(args: &[Object]) -> Option<Object> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Object::Array(elements) => elements.last().cloned(),
        other => new_error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn rest(args: &[Object]) -> Option<Object> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Object::Array(elements) if elements.len() > 1 => {
            Some(Object::Array(Rc::new(elements[1..].to_vec())))
        }
        Object::Array(_) => None,
        other => new_error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn push(args: &[Object]) -> Option<Object> {
    if args.len() != 2 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=2",
            args.len()
        ));
    }
    match &args[0] {
        Object::Array(elements) => {
            let mut appended = elements.as_ref().clone();
            appended.push(args[1].clone());
            Some(Object::Array(Rc::new(appended)))
        }
        other => new_error(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

fn pop(args: &[Object]) -> Option<Object> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Object::Array(elements) if elements.is_empty() => None,
        Object::Array(elements) => Some(Object::Array(Rc::new(
            elements[..elements.len() - 1].to_vec(),
        ))),
        other => new_error(format!(
            "argument to `pop` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// Domain builtin: list a directory as an array of hashes with `name`,
/// `size`, and `dir` entries.
fn fs_get_files(args: &[Object]) -> Option<Object> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }
    let path = match &args[0] {
        Object::Str(value) => value,
        other => {
            return new_error(format!(
                "first argument to `fs.GetFiles` must be STRING, got {}",
                other.type_name()
            ))
        }
    };

    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => return new_error(format!("unable to read {}: {}", path, err)),
    };
    debug!(path = %path, "scanning directory");

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => return new_error(format!("error during scan: {}", err)),
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => return new_error(format!("error during stat: {}", err)),
        };

        let mut pairs = HashMap::new();
        insert_pair(
            &mut pairs,
            "name",
            Object::Str(entry.file_name().to_string_lossy().into_owned()),
        );
        insert_pair(&mut pairs, "size", Object::Integer(metadata.len() as i64));
        insert_pair(&mut pairs, "dir", Object::Boolean(metadata.is_dir()));
        files.push(Object::Hash(Rc::new(pairs)));
    }

    Some(Object::Array(Rc::new(files)))
}

fn insert_pair(pairs: &mut HashMap<HashKey, HashPair>, key: &str, value: Object) {
    pairs.insert(
        HashKey::Str(key.to_string()),
        HashPair {
            key: Object::Str(key.to_string()),
            value,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(elements: Vec<Object>) -> Object {
        Object::Array(Rc::new(elements))
    }

    #[test]
    fn test_registry_order_is_stable() {
        let names: Vec<&str> = REGISTRY.iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            vec![
                "len",
                "puts",
                "putln",
                "gets",
                "first",
                "last",
                "rest",
                "push",
                "pop",
                "fs.GetFiles"
            ]
        );
    }

    #[test]
    fn test_len() {
        assert_eq!(
            len(&[Object::Str("hello".into())]),
            Some(Object::Integer(5))
        );
        assert_eq!(
            len(&[array(vec![Object::Integer(1), Object::Integer(2)])]),
            Some(Object::Integer(2))
        );
        match len(&[Object::Integer(1)]) {
            Some(Object::Error(message)) => {
                assert_eq!(message, "argument to `len` not supported, got INTEGER")
            }
            other => panic!("expected error, got {:?}", other),
        }
        match len(&[]) {
            Some(Object::Error(message)) => {
                assert_eq!(message, "wrong number of arguments. got=0, want=1")
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_first_last_rest() {
        let a = array(vec![
            Object::Integer(1),
            Object::Integer(2),
            Object::Integer(3),
        ]);
        assert_eq!(first(&[a.clone()]), Some(Object::Integer(1)));
        assert_eq!(last(&[a.clone()]), Some(Object::Integer(3)));
        assert_eq!(
            rest(&[a]),
            Some(array(vec![Object::Integer(2), Object::Integer(3)]))
        );
        // Empty array: no value, the VM turns this into Null.
        assert_eq!(first(&[array(vec![])]), None);
        assert_eq!(rest(&[array(vec![Object::Integer(1)])]), None);
    }

    #[test]
    fn test_push_is_non_mutating() {
        let original = array(vec![Object::Integer(1)]);
        let pushed = push(&[original.clone(), Object::Integer(2)]).unwrap();
        assert_eq!(
            pushed,
            array(vec![Object::Integer(1), Object::Integer(2)])
        );
        assert_eq!(original, array(vec![Object::Integer(1)]));
    }

    #[test]
    fn test_pop() {
        let a = array(vec![Object::Integer(1), Object::Integer(2)]);
        assert_eq!(pop(&[a]), Some(array(vec![Object::Integer(1)])));
        assert_eq!(
            pop(&[array(vec![Object::Integer(1)])]),
            Some(array(vec![]))
        );
        assert_eq!(pop(&[array(vec![])]), None);
    }

    #[test]
    fn test_fs_get_files_misuse_is_an_error_value() {
        match fs_get_files(&[Object::Integer(1)]) {
            Some(Object::Error(message)) => assert!(message.contains("must be STRING")),
            other => panic!("expected error, got {:?}", other),
        }
        match fs_get_files(&[Object::Str("/definitely/not/a/real/path".into())]) {
            Some(Object::Error(message)) => assert!(message.contains("unable to read")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_fs_get_files_lists_entries() {
        let dir = std::env::temp_dir().join("zeta-builtin-test");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(dir.join("a.txt"), b"abc").unwrap();

        match fs_get_files(&[Object::Str(dir.to_string_lossy().into_owned())]) {
            Some(Object::Array(entries)) => {
                assert!(!entries.is_empty());
                let names: Vec<String> = entries
                    .iter()
                    .filter_map(|entry| match entry {
                        Object::Hash(pairs) => {
                            pairs.get(&HashKey::Str("name".into())).map(|pair| {
                                pair.value.inspect()
                            })
                        }
                        _ => None,
                    })
                    .collect();
                assert!(names.contains(&"a.txt".to_string()));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }
}
