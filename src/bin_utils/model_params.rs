use metaes_models::nn::NonLinearity;

/// Capture the model parameters. Right now just neural network
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// hidden nodes
    pub hidden_nodes: Vec<usize>,
    /// Type of non-linearity between layers
    pub act: NonLinearity,
    /// Seed for the initial weights
    pub seed: u32,
    /// Optional path to load a model
    pub load_model_path: Option<String>,
    /// Optional path to save the model
    pub save_model_path: Option<String>,
}

/// Parses an activation name
pub fn parse_activation(name: &str) -> Option<NonLinearity> {
    match name {
        "relu" => Some(NonLinearity::ReLu),
        "tanh" => Some(NonLinearity::Tanh),
        "sigmoid" => Some(NonLinearity::Sigmoid),
        "elu" => Some(NonLinearity::ELU),
        "linear" => Some(NonLinearity::Linear),
        _ => None,
    }
}
