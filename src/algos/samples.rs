//! Trajectory sample batches
use crate::torch::distributions::DistInfo;
use crate::BmamlError;
use tch::Tensor;

/// Flattened trajectory samples of one task collected by one policy.
///
/// Every tensor has the same leading (batch) dimension.
#[derive(Debug)]
pub struct TaskBatch {
    observations: Tensor,
    actions: Tensor,
    advantages: Tensor,
    dist_info: DistInfo,
}

impl TaskBatch {
    /// Create a batch.
    ///
    /// # Args
    /// * `observations` - Observations with shape `[BATCH_SIZE, OBS_DIM]`.
    /// * `actions` - Actions with shape `[BATCH_SIZE, ...]`.
    /// * `advantages` - Advantage estimates with shape `[BATCH_SIZE]`.
    /// * `dist_info` - Action distribution of the sampling policy at each observation.
    pub fn new(
        observations: Tensor,
        actions: Tensor,
        advantages: Tensor,
        dist_info: DistInfo,
    ) -> Result<Self, BmamlError> {
        let advantages_shape = advantages.size();
        if advantages_shape.len() != 1 {
            return Err(BmamlError::AdvantageShape(advantages_shape));
        }
        let leading_dim = |t: &Tensor| t.size().first().copied().unwrap_or(1);
        let (num_observations, num_actions, num_advantages) = (
            leading_dim(&observations),
            leading_dim(&actions),
            advantages_shape[0],
        );
        if num_observations != num_actions || num_observations != num_advantages {
            return Err(BmamlError::BatchLength {
                observations: num_observations,
                actions: num_actions,
                advantages: num_advantages,
            });
        }
        Ok(Self {
            observations,
            actions,
            advantages,
            dist_info,
        })
    }

    pub const fn observations(&self) -> &Tensor {
        &self.observations
    }

    pub const fn actions(&self) -> &Tensor {
        &self.actions
    }

    pub const fn advantages(&self) -> &Tensor {
        &self.advantages
    }

    /// Distribution info recorded by the sampling policy.
    pub const fn dist_info(&self) -> &DistInfo {
        &self.dist_info
    }

    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.advantages.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sample batches indexed by `[particle][step][task]`.
///
/// Step `j` holds the samples collected by each particle's policy after `j` inner adaptation
/// steps. Every particle has the same number of steps and every step the same number of tasks.
#[derive(Debug, Default)]
pub struct SamplesData {
    batches: Vec<Vec<Vec<TaskBatch>>>,
    num_tasks: usize,
}

impl SamplesData {
    /// Create from batches indexed by `[particle][step][task]`.
    pub fn new(batches: Vec<Vec<Vec<TaskBatch>>>) -> Result<Self, BmamlError> {
        let num_steps = batches.first().map_or(0, Vec::len);
        let num_tasks = batches
            .first()
            .and_then(|steps| steps.first())
            .map_or(0, Vec::len);
        for (particle, steps) in batches.iter().enumerate() {
            if steps.len() != num_steps {
                return Err(BmamlError::NumSteps {
                    expected: num_steps,
                    actual: steps.len(),
                });
            }
            for (step, tasks) in steps.iter().enumerate() {
                if tasks.len() != num_tasks {
                    return Err(BmamlError::RaggedSamples {
                        particle,
                        step,
                        expected: num_tasks,
                        actual: tasks.len(),
                    });
                }
            }
        }
        Ok(Self { batches, num_tasks })
    }

    /// Samples for `num_particles` particles with no steps.
    pub fn empty(num_particles: usize) -> Self {
        Self {
            batches: (0..num_particles).map(|_| Vec::new()).collect(),
            num_tasks: 0,
        }
    }

    /// Append one step of samples indexed by `[particle][task]`.
    ///
    /// The first step pushed determines the number of tasks.
    pub fn push_step(&mut self, step: Vec<Vec<TaskBatch>>) -> Result<(), BmamlError> {
        if step.len() != self.num_particles() {
            return Err(BmamlError::NumParticles {
                expected: self.num_particles(),
                actual: step.len(),
            });
        }
        let step_index = self.num_steps();
        let num_tasks = if step_index == 0 {
            step.first().map_or(0, Vec::len)
        } else {
            self.num_tasks
        };
        if let Some((particle, tasks)) = step
            .iter()
            .enumerate()
            .find(|(_, tasks)| tasks.len() != num_tasks)
        {
            return Err(BmamlError::RaggedSamples {
                particle,
                step: step_index,
                expected: num_tasks,
                actual: tasks.len(),
            });
        }

        self.num_tasks = num_tasks;
        for (steps, tasks) in self.batches.iter_mut().zip(step) {
            steps.push(tasks);
        }
        Ok(())
    }

    pub fn num_particles(&self) -> usize {
        self.batches.len()
    }

    pub fn num_steps(&self) -> usize {
        self.batches.first().map_or(0, Vec::len)
    }

    pub const fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    /// The batch of one particle, step and task.
    ///
    /// # Panics
    /// If any index is out of range.
    pub fn get(&self, particle: usize, step: usize, task: usize) -> &TaskBatch {
        &self.batches[particle][step][task]
    }

    /// All task batches of one particle and step.
    ///
    /// # Panics
    /// If any index is out of range.
    pub fn step(&self, particle: usize, step: usize) -> &[TaskBatch] {
        &self.batches[particle][step]
    }

    /// Check that the samples have exactly the given dimensions.
    pub fn check_shape(
        &self,
        num_particles: usize,
        num_steps: usize,
        num_tasks: usize,
    ) -> Result<(), BmamlError> {
        if self.num_particles() != num_particles {
            return Err(BmamlError::NumParticles {
                expected: num_particles,
                actual: self.num_particles(),
            });
        }
        if self.num_steps() != num_steps {
            return Err(BmamlError::NumSteps {
                expected: num_steps,
                actual: self.num_steps(),
            });
        }
        if self.num_tasks != num_tasks {
            return Err(BmamlError::NumTasks {
                expected: num_tasks,
                actual: self.num_tasks,
            });
        }
        Ok(())
    }
}
