//! Interface de terminal do wolram-batch: barra de progresso e saída colorida.
//!
//! Usa `indicatif` para a barra de progresso do lote e `console` para
//! estilização com cores. O [`BatchProgress`] acompanha visualmente a
//! execução de um lote no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::report::ExecutionReport;
use crate::state_machine::{TaskResult, TaskStatus};

/// Indicador visual de progresso para a execução de um lote.
///
/// Avança uma posição a cada item concluído e imprime as falhas acima da
/// barra conforme acontecem.
pub struct BatchProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl BatchProgress {
    /// Inicia a barra com o total de itens do lote.
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Registra um item concluído.
    pub fn record(&self, result: &TaskResult) {
        self.pb.inc(1);
        self.pb.set_message(result.id.clone());
        match result.status {
            TaskStatus::Success => {}
            TaskStatus::Failed => {
                self.pb.println(format!(
                    "  {} {} after {} attempt(s): {}",
                    self.red.apply_to("✗"),
                    result.id,
                    result.attempts,
                    result.last_error.as_deref().unwrap_or("unknown error")
                ));
            }
            TaskStatus::Cancelled => {
                self.pb.println(format!(
                    "  {} {} cancelled",
                    self.yellow.apply_to("↷"),
                    result.id
                ));
            }
        }
    }

    /// Finaliza a barra e imprime o resumo do lote.
    pub fn finish(&self, report: &ExecutionReport) {
        self.pb.finish_and_clear();
        print_summary(report, &self.green, &self.red, &self.yellow);
    }
}

// O resumo vai para stderr; stdout fica reservado para o relatório JSON.
fn print_summary(report: &ExecutionReport, green: &Style, red: &Style, yellow: &Style) {
    eprintln!();
    if report.is_success() {
        eprintln!(
            "  {} {} item(s) succeeded in {}ms",
            green.apply_to("✓"),
            report.success_count,
            report.total_execution_time_ms
        );
    } else {
        eprintln!(
            "  {} {}/{} item(s) failed in {}ms ({} cancelled)",
            red.apply_to("✗"),
            report.failure_count,
            report.total,
            report.total_execution_time_ms,
            report.cancelled_count
        );
    }

    if !report.distinct_validation_errors.is_empty() {
        eprintln!("{}", yellow.apply_to("─── Validation errors ───"));
        for error in &report.distinct_validation_errors {
            eprintln!("  • {error}");
        }
    }
}
