//! 障碍物定义

/// 障碍物形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleShape {
    /// 轴对齐盒体，`size` 为三轴边长
    Box,
    /// 球体，`size[0]` 为直径
    Sphere,
}

/// 工作空间障碍物
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: [f64; 3],
    pub size: [f64; 3],
    pub shape: ObstacleShape,
}

impl Obstacle {
    pub fn boxed(center: [f64; 3], size: [f64; 3]) -> Self {
        Self {
            center,
            size,
            shape: ObstacleShape::Box,
        }
    }

    pub fn sphere(center: [f64; 3], diameter: f64) -> Self {
        Self {
            center,
            size: [diameter, diameter, diameter],
            shape: ObstacleShape::Sphere,
        }
    }

    /// 点是否落在障碍物内（边界算碰撞）
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        match self.shape {
            ObstacleShape::Box => (0..3)
                .all(|i| (point[i] - self.center[i]).abs() <= self.size[i] / 2.0),
            ObstacleShape::Sphere => {
                let radius = self.size[0] / 2.0;
                let dist_sq: f64 = (0..3)
                    .map(|i| (point[i] - self.center[i]) * (point[i] - self.center[i]))
                    .sum();
                dist_sq <= radius * radius
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_contains() {
        let b = Obstacle::boxed([0.0, 0.0, 0.0], [0.2, 0.4, 0.6]);
        assert!(b.contains(&[0.0, 0.0, 0.0]));
        assert!(b.contains(&[0.1, 0.2, 0.3])); // 边界算碰撞
        assert!(!b.contains(&[0.11, 0.0, 0.0]));
        assert!(!b.contains(&[0.0, 0.0, 0.31]));
    }

    #[test]
    fn test_sphere_contains() {
        let s = Obstacle::sphere([1.0, 0.0, 0.0], 0.2);
        assert!(s.contains(&[1.0, 0.0, 0.0]));
        assert!(s.contains(&[1.1, 0.0, 0.0])); // 半径 0.1 的边界
        assert!(!s.contains(&[1.11, 0.0, 0.0]));
        assert!(!s.contains(&[1.08, 0.08, 0.0]));
    }
}
