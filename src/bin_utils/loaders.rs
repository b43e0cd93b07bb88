use std::fs::File;
use std::time::Instant;

use tracing::info;

use metaes_core::model::sampler::ModelGS;
use metaes_core::model::SerDe;
use metaes_data::dataset::LabeledSet;
use metaes_data::load::{read_classification, read_classification_with};
use metaes_models::nn::{NNModel, Network};
use metaes_models::ModelError;

use crate::env::ClassifierEnv;

use super::args::DatasetMeta;
use super::model_params::ModelParams;
use super::{BinError, Result};

/// Loads the training dataset. If a validation dataset was provided, loads this as
/// well, encoded with the training classes.  Also returns the class names.
pub fn build_datasets(dm: &DatasetMeta) -> Result<(LabeledSet, Option<LabeledSet>, Vec<String>)> {
    let now = Instant::now();
    let (train, classes) = read_classification(&dm.fname, dm.dims)?;
    if train.is_empty() {
        return Err(BinError::Arg(format!("no examples in {}", dm.fname)));
    }

    let valid = match dm.vname {
        Some(ref name) => Some(read_classification_with(name, dm.dims, &classes)?),
        None => None,
    };
    info!("Loading runtime (secs): {}", now.elapsed().as_secs());
    Ok((train, valid, classes))
}

/// Builds the environment the evolution strategies score networks in
pub fn build_env(
    dm: &DatasetMeta,
    train: LabeledSet,
    valid: Option<LabeledSet>,
    seed: u32,
) -> ClassifierEnv {
    let mut env = ClassifierEnv::new(train, dm.reward);
    if dm.balance {
        env = env.with_balanced_classes();
    }
    if let Some(v) = valid {
        env = env.with_validation(v);
    }
    if let Some(size) = dm.mini_batch {
        env = env.with_minibatch(size, seed as u64 + 1);
    }
    env
}

/// Builds the initial network and its search direction sampler. If a previous model
/// was provided, we load that for incremental training.
pub fn build_init(
    mp: &ModelParams,
    dims: usize,
    n_classes: usize,
) -> Result<(Network, ModelGS<NNModel>)> {
    let network = match mp.load_model_path {
        Some(ref path) => {
            info!("Loading model from {}", path);
            let mut f = File::open(path).map_err(|e| BinError::File {
                path: path.clone(),
                source: e,
            })?;
            let network = Network::load(&mut f)?;
            check_dims(&network, dims, n_classes)?;
            network
        }
        None => {
            if dims == 0 || n_classes == 0 || mp.hidden_nodes.contains(&0) {
                return Err(BinError::Arg(format!(
                    "layer sizes must be positive: {} features, hidden {:?}, {} classes",
                    dims, mp.hidden_nodes, n_classes
                )));
            }
            NNModel::classifier(dims, &mp.hidden_nodes, mp.act, n_classes).init(mp.seed)
        }
    };

    let gs = ModelGS::standard(NNModel::from_network(&network), mp.seed);
    Ok((network, gs))
}

fn check_dims(network: &Network, dims: usize, n_classes: usize) -> Result<()> {
    if network.input_dims() != dims {
        return Err(ModelError::Width {
            what: "features",
            expected: network.input_dims(),
            got: dims,
        }
        .into());
    }
    if network.output_dims() != n_classes {
        return Err(ModelError::Width {
            what: "classes",
            expected: network.output_dims(),
            got: n_classes,
        }
        .into());
    }
    Ok(())
}

/// Write out the model to disk
pub fn write_model<M: SerDe<Error = ModelError>>(model: &M, smp: Option<&str>) -> Result<()> {
    if let Some(fname) = smp {
        info!("Writing model to {}", fname);
        let mut f = File::create(fname).map_err(|e| BinError::File {
            path: fname.into(),
            source: e,
        })?;
        model.save(&mut f)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Reward;
    use metaes_core::optimizer::Environment;
    use metaes_models::nn::NonLinearity;
    use std::io::Write;

    fn params() -> ModelParams {
        ModelParams {
            hidden_nodes: vec![3],
            act: NonLinearity::Tanh,
            seed: 9,
            load_model_path: None,
            save_model_path: None,
        }
    }

    #[test]
    fn test_datasets_share_classes() {
        let mut train = tempfile::NamedTempFile::new().unwrap();
        writeln!(train, "a 0:1\nb 1:1\nc 0:1 1:1").unwrap();
        train.flush().unwrap();
        let mut valid = tempfile::NamedTempFile::new().unwrap();
        writeln!(valid, "c 0:2").unwrap();
        valid.flush().unwrap();

        let dm = DatasetMeta {
            fname: train.path().to_str().unwrap().into(),
            vname: Some(valid.path().to_str().unwrap().into()),
            dims: 2,
            mini_batch: Some(2),
            reward: Reward::Accuracy,
            balance: true,
        };
        let (t, v, classes) = build_datasets(&dm).unwrap();
        assert_eq!(classes.len(), 3);
        assert_eq!(t.len(), 3);
        assert_eq!(v.as_ref().unwrap().y()[0], vec![0.0, 0.0, 1.0]);

        let mut env = build_env(&dm, t, v, 1);
        assert!(env.valid().is_some());
        assert!(env.step());
    }

    #[test]
    fn test_init_and_round_trip() {
        let (network, _gs) = build_init(&params(), 4, 2).unwrap();
        assert_eq!(network.input_dims(), 4);
        assert_eq!(network.output_dims(), 2);
        assert_eq!(network.sizes(), vec![3, 2]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let path = path.to_str().unwrap();
        write_model(&network, Some(path)).unwrap();

        let mut mp = params();
        mp.load_model_path = Some(path.into());
        let (loaded, _gs) = build_init(&mp, 4, 2).unwrap();
        assert_eq!(loaded, network);

        match build_init(&mp, 5, 2) {
            Err(BinError::Model(ModelError::Width { what, .. })) => assert_eq!(what, "features"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected a width error"),
        }
    }

    #[test]
    fn test_init_rejects_zero_sizes() {
        let mut mp = params();
        mp.hidden_nodes = vec![0];
        assert!(matches!(build_init(&mp, 2, 2), Err(BinError::Arg(_))));
        assert!(matches!(build_init(&params(), 0, 2), Err(BinError::Arg(_))));
    }

    #[test]
    fn test_load_rejects_unchained_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"layers": [
                {{"w": [[1.0, 0.0]], "bias": [0.0], "nl": "Tanh"}},
                {{"w": [[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]], "bias": [0.0, 0.0], "nl": "Softmax"}}
            ]}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let mut mp = params();
        mp.load_model_path = Some(file.path().to_str().unwrap().into());
        assert!(matches!(build_init(&mp, 2, 2), Err(BinError::Model(ModelError::Width { .. }))));
    }

    #[test]
    fn test_write_model_skips_without_path() {
        let network = NNModel::classifier(2, &[], NonLinearity::Tanh, 2).init(1);
        assert!(write_model(&network, None).is_ok());
    }
}
