//! Prints the KataConfig CustomResourceDefinition as YAML.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > config/crd/kataconfig.yaml
//! ```

use crds::KataConfig;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = KataConfig::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
