//! Print the MariaDB CustomResourceDefinition as YAML

use kube::CustomResourceExt;

use mariadb_operator::crd::MariaDB;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&MariaDB::crd())?);
    Ok(())
}
