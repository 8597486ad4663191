use std::collections::BTreeSet;
use std::fmt::{self, Write};
use std::fs::File;
use std::io::Write as IoWrite;
use std::process::Command;

use super::mode::Mode;
use super::node::{NodeId, Var};

/// Graph visualization for expressions built from `Var`s.
#[derive(Debug, Clone, Default)]
pub struct GraphVisualizer {
    pub config: VisualizationConfig,
}

/// Configuration for graph visualization
#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub show_shapes: bool,
    pub show_modes: bool,
    pub show_values: bool,
    /// Values with more elements than this are not printed.
    pub max_value_display: usize,
    pub forward_color: String,
    pub reverse_color: String,
    pub mix_color: String,
    pub constant_color: String,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            show_shapes: true,
            show_modes: true,
            show_values: false,
            max_value_display: 5,
            forward_color: "#E3F2FD".to_string(),
            reverse_color: "#FFF3E0".to_string(),
            mix_color: "#F3E5F5".to_string(),
            constant_color: "#EEEEEE".to_string(),
        }
    }
}

impl GraphVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    /// Generate DOT format representation of the graph feeding `outputs`.
    pub fn to_dot(&self, outputs: &[&Var]) -> String {
        let mut dot = String::new();
        self.write_dot(&mut dot, outputs)
            .expect("writing to a String cannot fail");
        dot
    }

    fn write_dot(&self, dot: &mut String, outputs: &[&Var]) -> fmt::Result {
        writeln!(dot, "digraph ComputationalGraph {{")?;
        writeln!(dot, "    rankdir=TB;")?;
        writeln!(dot, "    node [shape=box, style=filled];")?;
        writeln!(dot, "    edge [color=gray];")?;

        let nodes = self.collect_nodes(outputs);
        for var in &nodes {
            writeln!(
                dot,
                "    n{} [label=\"{}\", fillcolor=\"{}\"];",
                var.id().0,
                self.create_node_label(var)?,
                self.node_color(var.mode())
            )?;
        }
        for var in &nodes {
            for operand in var.operands() {
                writeln!(dot, "    n{} -> n{};", operand.id().0, var.id().0)?;
            }
        }
        writeln!(dot, "}}")
    }

    /// Every node reachable from `outputs`, operands before their consumers.
    fn collect_nodes(&self, outputs: &[&Var]) -> Vec<Var> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        for output in outputs {
            Self::collect_postorder(output, &mut visited, &mut order);
        }
        order
    }

    fn collect_postorder(var: &Var, visited: &mut BTreeSet<NodeId>, order: &mut Vec<Var>) {
        if !visited.insert(var.id()) {
            return;
        }
        for operand in var.operands() {
            Self::collect_postorder(&operand, visited, order);
        }
        order.push(var.clone());
    }

    fn create_node_label(&self, var: &Var) -> Result<String, fmt::Error> {
        let mut label = String::new();
        write!(label, "{}\\n{}", var.id(), Self::node_title(var))?;

        if self.config.show_shapes {
            write!(label, "\\nShape: {}", var.value().shape())?;
        }
        if self.config.show_modes {
            write!(label, "\\nMode: {:?}", var.mode())?;
        }
        if self.config.show_values {
            let value = var.value();
            if value.len() <= self.config.max_value_display {
                write!(label, "\\nValue: {}", value.to_string().replace('\n', " "))?;
            }
        }
        Ok(label)
    }

    fn node_title(var: &Var) -> String {
        match (var.op(), var.name()) {
            (Some(op), _) => op.symbol().to_string(),
            (None, Some(name)) => name.to_string(),
            (None, None) => "const".to_string(),
        }
    }

    fn node_color(&self, mode: Mode) -> &str {
        match mode {
            Mode::Forward => &self.config.forward_color,
            Mode::Reverse => &self.config.reverse_color,
            Mode::Mix => &self.config.mix_color,
            Mode::Constant => &self.config.constant_color,
        }
    }

    /// Save the graph as a DOT file
    pub fn save_dot(&self, outputs: &[&Var], filename: &str) -> Result<(), std::io::Error> {
        let dot_content = self.to_dot(outputs);
        let mut file = File::create(filename)?;
        file.write_all(dot_content.as_bytes())?;
        Ok(())
    }

    /// Generate and save the graph as an image (requires Graphviz)
    pub fn save_image(
        &self,
        outputs: &[&Var],
        filename: &str,
        format: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let temp_dot = format!("{}.dot", filename);
        self.save_dot(outputs, &temp_dot)?;

        let output = Command::new("dot")
            .arg(format!("-T{}", format))
            .arg(&temp_dot)
            .arg("-o")
            .arg(filename)
            .output()?;

        if !output.status.success() {
            return Err(format!(
                "Graphviz failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }

        std::fs::remove_file(&temp_dot)?;
        Ok(())
    }

    /// Print the graph to console, operands first.
    pub fn print_graph(&self, outputs: &[&Var]) {
        println!("Computational Graph:");
        println!("===================");

        for var in self.collect_nodes(outputs) {
            print!("Node {}: {} ", var.id(), Self::node_title(&var));
            if self.config.show_shapes {
                print!("Shape: {} ", var.value().shape());
            }
            if self.config.show_modes {
                print!("Mode: {:?} ", var.mode());
            }
            let operands = var.operands();
            if !operands.is_empty() {
                let ids: Vec<String> = operands.iter().map(|o| o.id().to_string()).collect();
                print!("Inputs: [{}]", ids.join(", "));
            }
            println!();
        }
    }
}
