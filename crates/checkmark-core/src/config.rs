use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::filter::FilterMode;
use crate::storage::STORAGE_KEY;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "storage.key".to_string(),
      STORAGE_KEY.to_string()
    );
    map.insert(
      "default.filter".to_string(),
      FilterMode::All.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    todorc_override
  ))]
  pub fn load(
    todorc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let todorc = resolve_todorc_path(
      todorc_override
    );
    if let Some(path) = todorc {
      info!(todorc = %path.display(), "loading todorc");
      cfg.load_file(
        &path,
        &mut Vec::new()
      )?;
    } else {
      debug!(
        "no todorc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `None` when unset; an
  /// unrecognized value is an error
  /// naming the key.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    match self.map.get(key) {
      | Some(raw) => {
        parse_bool(raw)
          .map(Some)
          .ok_or_else(|| {
            anyhow!(
              "invalid {key} setting: \
               {raw}"
            )
          })
      }
      | None => Ok(None)
    }
  }

  pub fn storage_key(&self) -> String {
    self
      .get("storage.key")
      .map(|k| k.trim().to_string())
      .filter(|k| !k.is_empty())
      .unwrap_or_else(|| {
        STORAGE_KEY.to_string()
      })
  }

  pub fn default_filter(
    &self
  ) -> anyhow::Result<FilterMode> {
    match self.get("default.filter") {
      | Some(raw) => {
        raw.parse::<FilterMode>().with_context(|| {
          format!(
            "invalid default.filter \
             value: {raw}"
          )
        })
      }
      | None => Ok(FilterMode::All)
    }
  }

  /// `include_stack` holds the
  /// canonical paths of the files
  /// currently being read.
  #[tracing::instrument(skip(
    self,
    include_stack
  ))]
  fn load_file(
    &mut self,
    path: &Path,
    include_stack: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let canonical = fs::canonicalize(
      &path
    )
    .with_context(|| {
      format!(
        "failed to resolve {}",
        path.display()
      )
    })?;
    if include_stack.contains(&canonical)
    {
      let chain = include_stack
        .iter()
        .chain(std::iter::once(
          &canonical
        ))
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
      bail!(
        "config include cycle: {chain}"
      );
    }
    include_stack.push(canonical);

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self.load_file(
            &include_path,
            include_stack
          )?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    include_stack.pop();
    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_todorc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(todorc_env) =
    std::env::var("TODORC")
  {
    if todorc_env == "/dev/null" {
      return None;
    }
    return Some(PathBuf::from(
      todorc_env
    ));
  }

  let candidate =
    dirs::home_dir()?.join(".todorc");
  candidate
    .exists()
    .then_some(candidate)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .or_else(|| {
      dirs::home_dir().map(|home| {
        home.join(".local/share")
      })
    })
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("checkmark"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::Config;
  use crate::filter::FilterMode;

  #[test]
  fn defaults_apply_without_rc_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.storage_key(),
      "todos.v1"
    );
    assert_eq!(
      cfg.default_filter().ok(),
      Some(FilterMode::All)
    );
    assert_eq!(
      cfg.get_bool("color").ok(),
      Some(Some(true))
    );
    assert_eq!(
      cfg.get_bool("missing").ok(),
      Some(None)
    );
  }

  #[test]
  fn unrecognized_bool_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(
      cfg.get_bool("color").is_err()
    );
  }

  #[test]
  fn self_include_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let path =
      temp.path().join("todorc");
    fs::write(&path, "include todorc\n")
      .expect("write");

    let err = Config::load(Some(
      path.as_path()
    ))
    .expect_err("cycle must fail");
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );
  }

  #[test]
  fn mutual_includes_are_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let a = temp.path().join("a.rc");
    let b = temp.path().join("b.rc");
    fs::write(&a, "include b.rc\n")
      .expect("write a");
    fs::write(&b, "include a.rc\n")
      .expect("write b");

    assert!(
      Config::load(Some(a.as_path()))
        .is_err()
    );
  }

  #[test]
  fn shared_include_is_not_a_cycle() {
    let temp =
      tempdir().expect("tempdir");
    let main = temp.path().join("main");
    fs::write(
      &main,
      "include left.rc\n\
       include right.rc\n"
    )
    .expect("write main");
    fs::write(
      temp.path().join("left.rc"),
      "include common.rc\n"
    )
    .expect("write left");
    fs::write(
      temp.path().join("right.rc"),
      "include common.rc\n"
    )
    .expect("write right");
    fs::write(
      temp.path().join("common.rc"),
      "color = off\n"
    )
    .expect("write common");

    let cfg = Config::load(Some(
      main.as_path()
    ))
    .expect("load");
    assert_eq!(
      cfg.get_bool("color").ok(),
      Some(Some(false))
    );
    assert_eq!(
      cfg.loaded_files.len(),
      5
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides()
   {
    let temp =
      tempdir().expect("tempdir");
    let main = temp.path().join("todorc");
    let extra =
      temp.path().join("extra.rc");
    fs::write(
      &main,
      "# comment\nstorage.key = \
       work.v1\ninclude extra.rc\n\
       include missing.rc\n"
    )
    .expect("write main");
    fs::write(
      &extra,
      "default.filter = open # trailing\n"
    )
    .expect("write extra");

    let mut cfg = Config::load(Some(
      main.as_path()
    ))
    .expect("load config");
    assert_eq!(
      cfg.loaded_files.len(),
      2
    );
    assert_eq!(
      cfg.storage_key(),
      "work.v1"
    );
    assert_eq!(
      cfg.default_filter().ok(),
      Some(FilterMode::Open)
    );

    cfg.apply_overrides(vec![(
      "rc.default.filter".to_string(),
      "done".to_string()
    )]);
    assert_eq!(
      cfg.default_filter().ok(),
      Some(FilterMode::Done)
    );
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let path = temp.path().join("bad");
    fs::write(&path, "no equals here\n")
      .expect("write");

    assert!(
      Config::load(Some(path.as_path()))
        .is_err()
    );
  }

  #[test]
  fn invalid_default_filter_is_reported()
   {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "default.filter".to_string(),
      "someday".to_string()
    )]);
    assert!(
      cfg.default_filter().is_err()
    );
  }
}
