use crate::expectand::Expectands;
use crate::hmc::{AdaptationInfoProvider, HmcDiagnostics};
use crate::{Array1, Array2};
use anyhow::{anyhow, bail, Context, Error, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

const INV_METRIC_COMMENT: &str = "Diagonal elements of inverse mass matrix:";

/// One CmdStan output file: the draws of a single chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StanChain {
    pub source: PathBuf,
    pub header: Vec<String>,
    /// Column-major draws, one vector per header entry.
    pub columns: Array2,
    pub step_size: Option<f64>,
    pub inv_metric: Option<Array1>,
    pub max_depth: Option<u32>,
}

impl StanChain {
    /// Parses CmdStan CSV output.  `source` is only used in error messages.
    pub fn parse<R: BufRead>(source: &Path, reader: R) -> Result<Self, Error> {
        let mut chain = StanChain {
            source: source.to_path_buf(),
            header: Vec::new(),
            columns: Vec::new(),
            step_size: None,
            inv_metric: None,
            max_depth: None,
        };
        let mut expect_inv_metric = false;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.with_context(|| format!("{}:{}", source.display(), line_no))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                chain
                    .parse_comment(comment.trim(), expect_inv_metric)
                    .with_context(|| format!("{}:{}", source.display(), line_no))?;
                expect_inv_metric = comment.trim() == INV_METRIC_COMMENT;
                continue;
            }
            if chain.header.is_empty() {
                chain.header = line.split(',').map(|name| name.trim().to_string()).collect();
                chain.columns = vec![Vec::new(); chain.header.len()];
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != chain.header.len() {
                bail!(
                    "{}:{}: expected {} fields, found {}",
                    source.display(),
                    line_no,
                    chain.header.len(),
                    fields.len()
                );
            }
            for (column, (field, name)) in fields.iter().zip(&chain.header).enumerate() {
                let value = field.trim().parse::<f64>().with_context(|| {
                    format!(
                        "{}:{}: invalid value `{}` in column `{}`",
                        source.display(),
                        line_no,
                        field,
                        name
                    )
                })?;
                chain.columns[column].push(value);
            }
        }

        if chain.header.is_empty() {
            bail!("{}: no header line", source.display());
        }
        Ok(chain)
    }

    fn parse_comment(&mut self, comment: &str, expect_inv_metric: bool) -> Result<(), Error> {
        if expect_inv_metric {
            let elements = comment
                .split(',')
                .map(|x| x.trim().parse::<f64>())
                .collect::<Result<Array1, _>>()
                .context("invalid inverse metric")?;
            self.inv_metric = Some(elements);
        } else if let Some(value) = comment.strip_prefix("Step size =") {
            self.step_size = Some(value.trim().parse().context("invalid step size")?);
        } else if let Some(value) = comment.strip_prefix("max_depth =") {
            let depth = value
                .split_whitespace()
                .next()
                .ok_or_else(|| anyhow!("missing max_depth value"))?;
            self.max_depth = Some(depth.parse().context("invalid max_depth")?);
        }
        Ok(())
    }

    pub fn num_draws(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn column(&self, name: &str) -> Option<&Array1> {
        self.header
            .iter()
            .position(|h| h == name)
            .map(|idx| &self.columns[idx])
    }
}

/// Draws of every chain of one CmdStan run.
#[derive(Debug, Clone, PartialEq)]
pub struct StanCsv {
    pub chains: Vec<StanChain>,
}

impl StanCsv {
    /// Reads one CSV file per chain.
    pub fn read<P: AsRef<Path>>(paths: &[P]) -> Result<Self, Error> {
        let chains = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let f = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                StanChain::parse(path, BufReader::new(f))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_chains(chains)
    }

    /// Combines parsed chains, which must share a header.
    pub fn from_chains(chains: Vec<StanChain>) -> Result<Self, Error> {
        let first = chains.first().ok_or_else(|| anyhow!("no chains supplied"))?;
        for chain in &chains[1..] {
            if chain.header != first.header {
                bail!(
                    "{} has different columns than {}",
                    chain.source.display(),
                    first.source.display()
                );
            }
        }
        log::debug!(
            "read {} chains with {} columns",
            chains.len(),
            first.header.len()
        );
        Ok(Self { chains })
    }

    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    /// Model parameter and generated quantity names, skipping the sampler
    /// columns that end in `__`.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.chains.first().map_or_else(Vec::new, |chain| {
            chain
                .header
                .iter()
                .map(String::as_str)
                .filter(|name| !name.ends_with("__"))
                .collect()
        })
    }

    /// Draws of one column across chains.
    pub fn column(&self, name: &str) -> Result<Array2, Error> {
        self.chains
            .iter()
            .map(|chain| {
                chain
                    .column(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("{} has no column `{}`", chain.source.display(), name))
            })
            .collect()
    }

    pub fn expectands(&self) -> Result<Expectands, Error> {
        let mut expectands = Expectands::new();
        for name in self.parameter_names() {
            expectands.insert(name, self.column(name)?)?;
        }
        Ok(expectands)
    }

    /// Maximum tree depth from the sampler configuration of the first chain.
    pub fn max_treedepth(&self) -> Option<u32> {
        self.chains.first().and_then(|chain| chain.max_depth)
    }

    pub fn hmc_diagnostics(&self) -> Result<HmcDiagnostics, Error> {
        for chain in &self.chains {
            if chain.step_size.is_none() || chain.inv_metric.is_none() {
                bail!("{} has no adaptation information", chain.source.display());
            }
        }
        let divergent = self
            .column("divergent__")?
            .into_iter()
            .map(|chain| chain.into_iter().map(|d| d != 0.0).collect())
            .collect();
        let treedepth = self
            .column("treedepth__")?
            .into_iter()
            .map(|chain| chain.into_iter().map(|d| d as u32).collect())
            .collect();
        let accept_stat = self.column("accept_stat__")?;
        let energy = self.column("energy__")?;
        HmcDiagnostics::new(divergent, treedepth, accept_stat, &energy, self)
            .context("inconsistent sampler diagnostics")
    }
}

impl AdaptationInfoProvider for StanCsv {
    fn step_sizes(&self) -> Vec<f64> {
        self.chains.iter().filter_map(|c| c.step_size).collect()
    }

    fn inv_metrics(&self) -> Vec<Array1> {
        self.chains
            .iter()
            .filter_map(|c| c.inv_metric.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HmcConfig;
    use crate::hmc::check_all_hmc_diagnostics;
    use std::io::Cursor;

    fn fixture_paths() -> Vec<PathBuf> {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test/stan");
        vec![dir.join("chain1.csv"), dir.join("chain2.csv")]
    }

    fn parse_str(text: &str) -> Result<StanChain, Error> {
        StanChain::parse(Path::new("inline.csv"), Cursor::new(text))
    }

    #[test]
    fn test_read_fixtures() {
        let csv = StanCsv::read(&fixture_paths()).unwrap();
        assert_eq!(csv.num_chains(), 2);
        assert_eq!(csv.parameter_names(), vec!["mu", "tau"]);
        assert_eq!(csv.max_treedepth(), Some(10));
        assert_eq!(csv.step_sizes(), vec![0.512, 0.447]);
        assert_eq!(csv.inv_metrics(), vec![vec![10.7, 0.83], vec![12.1, 0.91]]);
        assert!(csv.chains.iter().all(|c| c.num_draws() == 10));

        let expectands = csv.expectands().unwrap();
        assert_eq!(expectands.len(), 2);
        let mu = expectands.get("mu").unwrap();
        assert_eq!(mu[0][0], 4.31);
        assert_eq!(mu[1][9], 4.05);
    }

    #[test]
    fn test_fixture_hmc_diagnostics() {
        let csv = StanCsv::read(&fixture_paths()).unwrap();
        let diagnostics = csv.hmc_diagnostics().unwrap();
        assert_eq!(diagnostics.num_chains(), 2);
        assert!(diagnostics.divergent[0][3]);
        assert_eq!(diagnostics.treedepth[1][2], 10);

        let report = check_all_hmc_diagnostics(&diagnostics, &HmcConfig::default()).unwrap();
        assert_eq!(report.divergences.per_chain, vec![1, 0]);
        assert_eq!(report.treedepth.per_chain, vec![0, 1]);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = parse_str("a,b\n1.0,oops\n").unwrap_err();
        assert!(format!("{:#}", err).contains("inline.csv:2"), "{:#}", err);

        let err = parse_str("a,b\n1.0\n").unwrap_err();
        assert!(err.to_string().contains("expected 2 fields"));

        assert!(parse_str("# only comments\n").is_err());
        assert!(StanCsv::read(&["does/not/exist.csv"]).is_err());
    }

    #[test]
    fn test_mismatched_headers() {
        let a = parse_str("x,y\n1,2\n").unwrap();
        let b = parse_str("x,z\n1,2\n").unwrap();
        assert!(StanCsv::from_chains(vec![a.clone(), b]).is_err());
        assert!(StanCsv::from_chains(vec![]).is_err());

        let csv = StanCsv::from_chains(vec![a]).unwrap();
        assert!(csv.hmc_diagnostics().is_err());
        assert!(csv.column("w").is_err());
    }
}
