use std::{borrow::Borrow, collections::HashMap, ffi::OsStr, hash::Hash};

pub type Result = std::result::Result<String, InterpError>;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterpError {
    #[error("Undefined variable '{0}' at column {}", .1+1)]
    UndefinedVar(String, usize),

    #[error("Unclosed brace (opened at column {})", .0+1)]
    UnclosedBrace(usize),
}

/// Expands `#{name}` placeholders in `fmt` with `variables`.
/// `##` is an escaped `#`; any other `#` is kept as is.
pub fn interp<K, V>(fmt: &str, variables: &HashMap<K, V>) -> Result
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<OsStr>,
{
    let mut res = String::with_capacity(fmt.len() * 2);
    let mut chars = fmt.chars().enumerate().peekable();

    while let Some((col, c)) = chars.next() {
        if c != '#' {
            res.push(c);
            continue;
        }
        match chars.peek() {
            Some((_, '#')) => {
                chars.next();
                res.push('#');
            }
            Some((_, '{')) => {
                chars.next();
                let mut var_name = String::with_capacity(16);
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => var_name.push(c),
                        None => return Err(InterpError::UnclosedBrace(col)),
                    }
                }
                let Some(value) = variables.get(var_name.as_str()) else {
                    return Err(InterpError::UndefinedVar(var_name, col));
                };
                res += value.as_ref().to_string_lossy().as_ref();
            }
            _ => res.push('#'),
        }
    }

    res.shrink_to_fit();
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn expands_build_variables() {
        let vars = hashmap! {
            "sources" => "Main.java Util.java",
            "workDir" => "/tmp/sol",
            "problem" => "t9spelling",
        };

        assert_eq!(interp("javac #{sources}", &vars).unwrap(), "javac Main.java Util.java");
        assert_eq!(
            interp("cd #{workDir} && ./#{problem}", &vars).unwrap(),
            "cd /tmp/sol && ./t9spelling"
        );
        assert_eq!(interp("java Main", &vars).unwrap(), "java Main");
    }

    #[test]
    fn keeps_or_escapes_hash_marks() {
        let vars = hashmap! { "problem" => "hello" };

        assert_eq!(interp("echo '#' #{problem}", &vars).unwrap(), "echo '#' hello");
        assert_eq!(interp("##{problem}", &vars).unwrap(), "#{problem}");
        assert_eq!(interp("# {problem}", &vars).unwrap(), "# {problem}");
        assert_eq!(interp("#", &vars).unwrap(), "#");
        assert_eq!(interp("##", &vars).unwrap(), "#");
        assert_eq!(interp("###", &vars).unwrap(), "##");
        assert_eq!(interp("{problem}", &vars).unwrap(), "{problem}");
    }

    #[test]
    fn reports_bad_templates() {
        let vars = hashmap! { "sources" => "a.c" };
        assert_eq!(
            interp("gcc #{sources} -o #{out}", &vars).unwrap_err(),
            InterpError::UndefinedVar("out".to_owned(), 18)
        );
        assert_eq!(
            interp("gcc #{sources", &vars).unwrap_err(),
            InterpError::UnclosedBrace(4)
        );
    }
}
